//! ln-rebalancer: channel liquidity rebalancing for a Lightning node
//!
//! This crate drives circular rebalances on a node that exposes an
//! LND-compatible REST interface:
//!
//! - **Channel directory**: fetches the node's open channels and ranks them by
//!   balance ratio for outgoing/incoming selection
//! - **Selection state machine**: outgoing channel, then incoming channel, then
//!   amount and optional max fee
//! - **Execution controller**: runs the rebalance as a cancellable task and
//!   resets the selection on every terminal outcome
//! - **HTTP API**: JSON endpoints the dashboard front-end talks to
//!
//! # Architecture
//!
//! 1. [`node::NodeClient`] talks to the node over REST and implements [`node::NodeApi`]
//! 2. [`balance::RebalanceSession`] owns one operator's selection and run
//! 3. [`api`] exposes the session and the channel list over HTTP
//! 4. [`notify::NotificationHub`] collects success/error notifications
//!
#![warn(missing_docs)]

pub mod api;
pub mod balance;
pub mod config;
pub mod format;
pub mod node;
pub mod notify;

use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub use config::Config;
use balance::{RebalanceSession, Rejected};
use node::{NodeApi, NodeClient};
use notify::NotificationHub;

/// The main application state
#[derive(Clone)]
pub struct RebalancerApp {
    /// Application configuration
    pub config: Arc<Config>,
    /// Node backend
    pub node: Arc<dyn NodeApi>,
    /// The operator's rebalance session
    pub session: Arc<RebalanceSession>,
    /// Notification sink shared by the session and the API
    pub notifications: Arc<NotificationHub>,
}

impl RebalancerApp {
    /// Create a new application connected to the configured node
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing ln-rebalancer...");

        let config = Arc::new(config);
        let client = NodeClient::connect(&config.node, &config.rebalance).await?;

        Ok(Self::with_node(config, Arc::new(client)))
    }

    /// Assemble the application around an already constructed node backend
    pub fn with_node(config: Arc<Config>, node: Arc<dyn NodeApi>) -> Self {
        let notifications = Arc::new(NotificationHub::new(&config.notifications));
        let session = Arc::new(RebalanceSession::new(
            config.rebalance.clone(),
            node.clone(),
            notifications.clone(),
        ));

        Self {
            config,
            node,
            session,
            notifications,
        }
    }

    /// Start the application
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(tokio::sync::oneshot::channel().1).await
    }

    /// Start the application with shutdown signal
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        info!("Starting ln-rebalancer...");

        // A failed first load leaves the session usable; the operator can refresh later
        self.session.refresh().await;

        let api_handle = tokio::spawn({
            let app = self.clone();
            async move {
                if let Err(e) = api::serve_with_shutdown(app, shutdown_rx).await {
                    warn!("API server error: {}", e);
                }
            }
        });

        info!(
            "ln-rebalancer running. API available at http://{}",
            self.config.api_bind_address()
        );

        api_handle.await?;

        Ok(())
    }

    /// Shutdown the application gracefully.
    ///
    /// An in-flight rebalance is cancelled and its acknowledgment awaited, so
    /// the self-invoice is cancelled before the runtime goes away.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down ln-rebalancer...");

        if self.session.cancel().await.is_ok() {
            info!("Cancellation requested for in-flight rebalance, waiting for the node");
            let grace = Duration::from_secs(self.config.node.timeout_seconds);
            match tokio::time::timeout(grace, self.session.wait_for_run()).await {
                Ok(outcome) => info!("In-flight rebalance ended: {:?}", outcome),
                Err(_) => warn!("Node did not acknowledge cancellation within {:?}", grace),
            }
        }

        info!("ln-rebalancer shutdown complete");
        Ok(())
    }
}

/// Error types for the rebalancer
#[derive(thiserror::Error, Debug)]
pub enum RebalanceError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lightning node error
    #[error("Lightning node error: {0}")]
    Node(String),

    /// HTTP transport error talking to the node
    #[error("Transport error: {0}")]
    Transport(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A selection or execution transition was refused
    #[error("Rejected: {0}")]
    Rejected(#[from] Rejected),

    /// Rebalancing is not available for the connected node
    #[error("Channel balancing is not available: {0}")]
    Unavailable(String),

    /// The channel is not part of the current channel list
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// There is no rebalance in flight
    #[error("No rebalance in progress")]
    NoActiveRun,

    /// The node reported a failed rebalance attempt
    #[error("Rebalance failed: {0}")]
    Rebalance(String),
}

/// Result type alias for rebalancer operations
pub type RebalanceResult<T> = std::result::Result<T, RebalanceError>;
