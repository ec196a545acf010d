//! Operator session
//!
//! A [`RebalanceSession`] ties the workflow together for one operator: the
//! node version gate, the channel directory, the selection intent and the
//! latest run. Clients query it through [`RebalanceSession::snapshot`] and
//! drive it through the transition methods; each transition is serialized
//! through the intent's lock.

use crate::{
    balance::{
        balance_ratio_precise,
        controller::{RebalanceController, RebalanceRun, RunOutcome, RunSummary},
        directory::{ChannelDirectory, DirectoryStatus},
        incoming_candidates, outgoing_candidates,
        selection::{IntentState, RebalanceIntent, Rejected},
    },
    config::RebalanceConfig,
    format::{format_amount, short_amount, Unit},
    node::{Channel, ChannelFilter, ChannelId, NodeApi, NodeVersion},
    notify::Notifier,
    RebalanceError, RebalanceResult,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Whether the connected node supports rebalancing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    /// The node version was not checked yet, or the check failed
    Unknown,
    /// Rebalancing is supported
    Supported {
        /// Node version
        version: String,
    },
    /// The node is too old
    Unsupported {
        /// Node version
        version: String,
        /// Lowest supported minor version
        required_minor: u32,
    },
}

impl Availability {
    /// Gate the workflow on the node version
    pub fn for_version(version: &NodeVersion, min_minor_version: u32) -> Self {
        if version.major > 0 || version.minor >= min_minor_version {
            Availability::Supported {
                version: version.to_string(),
            }
        } else {
            Availability::Unsupported {
                version: version.to_string(),
                required_minor: min_minor_version,
            }
        }
    }

    fn ensure_supported(&self) -> RebalanceResult<()> {
        match self {
            Availability::Supported { .. } => Ok(()),
            Availability::Unknown => Err(RebalanceError::Unavailable(
                "the node version is not known yet, refresh once the node is reachable".to_string(),
            )),
            Availability::Unsupported {
                version,
                required_minor,
            } => Err(RebalanceError::Unavailable(format!(
                "channel balancing needs node version 0.{}.0 or newer, this node runs {}; update the node to use this feature",
                required_minor, version
            ))),
        }
    }
}

/// A channel as presented to clients
#[derive(Debug, Clone, Serialize)]
pub struct ChannelView {
    /// Channel ID
    pub id: String,
    /// Partner public key
    pub partner_public_key: String,
    /// Capacity in satoshis
    pub capacity: u64,
    /// Local balance in satoshis
    pub local_balance: u64,
    /// Remote balance in satoshis
    pub remote_balance: u64,
    /// Local balance percentage, rounded
    pub balance_ratio: u8,
    /// Local balance percentage with two decimals
    pub balance_ratio_precise: f64,
    /// Local balance for display
    pub local_display: String,
    /// Remote balance for display
    pub remote_display: String,
    /// Capacity in compact form
    pub capacity_short: String,
    /// Channel is active
    pub active: bool,
    /// Channel is private
    pub private: bool,
}

impl From<&Channel> for ChannelView {
    fn from(c: &Channel) -> Self {
        Self {
            id: c.id.to_string(),
            partner_public_key: c.partner_public_key.clone(),
            capacity: c.capacity,
            local_balance: c.local_balance,
            remote_balance: c.remote_balance,
            balance_ratio: c.balance_ratio(),
            balance_ratio_precise: balance_ratio_precise(c.local_balance, c.remote_balance),
            local_display: format_amount(c.local_balance, Unit::Sat),
            remote_display: format_amount(c.remote_balance, Unit::Sat),
            capacity_short: short_amount(c.capacity),
            active: c.active,
            private: c.private,
        }
    }
}

/// Everything a client needs to render the workflow
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Feature gate
    pub availability: Availability,
    /// Channel directory status
    pub directory: DirectoryStatus,
    /// Coarse intent state
    pub state: IntentState,
    /// Chosen outgoing channel
    pub outgoing: Option<ChannelView>,
    /// Chosen incoming channel
    pub incoming: Option<ChannelView>,
    /// Amount in satoshis
    pub amount: Option<u64>,
    /// Fee ceiling in satoshis
    pub max_fee: Option<u64>,
    /// A run holds the intent
    pub blocked: bool,
    /// Channels selectable as outgoing, lowest ratio first
    pub outgoing_candidates: Vec<ChannelView>,
    /// Channels selectable as incoming, highest ratio first
    pub incoming_candidates: Vec<ChannelView>,
    /// Latest run
    pub run: Option<RunSummary>,
}

/// One operator's rebalance workflow
pub struct RebalanceSession {
    /// Workflow configuration
    config: RebalanceConfig,
    /// Node backend
    node: Arc<dyn NodeApi>,
    /// Notification sink
    notifier: Arc<dyn Notifier>,
    /// Execution controller
    controller: RebalanceController,
    /// Feature gate
    availability: RwLock<Availability>,
    /// Last channel listing
    directory: RwLock<ChannelDirectory>,
    /// Selection being built
    intent: Arc<Mutex<RebalanceIntent>>,
    /// Latest run, kept after it finishes so clients can read the outcome
    run: Mutex<Option<RebalanceRun>>,
}

impl RebalanceSession {
    /// Create a new session
    pub fn new(
        config: RebalanceConfig,
        node: Arc<dyn NodeApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let controller = RebalanceController::new(node.clone(), notifier.clone());
        Self {
            config,
            node,
            notifier,
            controller,
            availability: RwLock::new(Availability::Unknown),
            directory: RwLock::new(ChannelDirectory::new()),
            intent: Arc::new(Mutex::new(RebalanceIntent::new())),
            run: Mutex::new(None),
        }
    }

    /// Check the node version and reload channels.
    ///
    /// Failures are reported through the notifier and reflected in the
    /// snapshot; the session stays usable.
    pub async fn refresh(&self) {
        let availability = match self.node.get_node_version().await {
            Ok(version) => {
                let availability = Availability::for_version(&version, self.config.min_minor_version);
                info!("Node version {}: {:?}", version, availability);
                availability
            }
            Err(e) => {
                warn!("Failed to get node version: {}", e);
                self.notifier
                    .notify_error(&format!("Unable to reach node: {}", e));
                Availability::Unknown
            }
        };

        let supported = matches!(availability, Availability::Supported { .. });
        *self.availability.write().await = availability;

        if !supported {
            return;
        }

        let filter = ChannelFilter {
            active_only: self.config.active_only,
        };
        let directory =
            ChannelDirectory::fetch(self.node.as_ref(), filter, self.notifier.as_ref()).await;
        *self.directory.write().await = directory;
    }

    /// Current view of the workflow
    pub async fn snapshot(&self) -> SessionSnapshot {
        let availability = self.availability.read().await.clone();
        let run = self.run.lock().await.as_ref().map(RebalanceRun::summary);
        let intent = self.intent.lock().await.clone();
        let directory = self.directory.read().await;

        let selectable = matches!(availability, Availability::Supported { .. }) && !intent.is_blocked();
        let outgoing_list = if selectable && intent.state() == IntentState::Empty {
            outgoing_candidates(directory.channels())
                .into_iter()
                .map(ChannelView::from)
                .collect()
        } else {
            Vec::new()
        };
        let incoming_list = match intent.outgoing() {
            Some(outgoing) if selectable && intent.state() == IntentState::OutgoingChosen => {
                incoming_candidates(directory.channels(), Some(&outgoing.id))
                    .into_iter()
                    .map(ChannelView::from)
                    .collect()
            }
            _ => Vec::new(),
        };

        SessionSnapshot {
            availability,
            directory: directory.status(),
            state: intent.state(),
            outgoing: intent.outgoing().map(ChannelView::from),
            incoming: intent.incoming().map(ChannelView::from),
            amount: intent.amount(),
            max_fee: intent.max_fee(),
            blocked: intent.is_blocked(),
            outgoing_candidates: outgoing_list,
            incoming_candidates: incoming_list,
            run,
        }
    }

    /// Channels from the last listing, in node order
    pub async fn channels(&self) -> Vec<Channel> {
        self.directory.read().await.channels().to_vec()
    }

    async fn ensure_available(&self) -> RebalanceResult<()> {
        self.availability.read().await.ensure_supported()
    }

    async fn lookup(&self, id: &ChannelId) -> RebalanceResult<Channel> {
        self.directory
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RebalanceError::UnknownChannel(id.to_string()))
    }

    /// Choose the outgoing channel by ID
    pub async fn choose_outgoing(&self, id: &ChannelId) -> RebalanceResult<()> {
        self.ensure_available().await?;
        let channel = self.lookup(id).await?;
        self.intent.lock().await.choose_outgoing(channel)?;
        info!("Outgoing channel chosen: {}", id);
        Ok(())
    }

    /// Choose the incoming channel by ID
    pub async fn choose_incoming(&self, id: &ChannelId) -> RebalanceResult<()> {
        self.ensure_available().await?;
        let channel = self.lookup(id).await?;
        self.intent.lock().await.choose_incoming(channel)?;
        info!("Incoming channel chosen: {}", id);
        Ok(())
    }

    /// Set or clear the amount
    pub async fn set_amount(&self, amount: Option<u64>) -> RebalanceResult<()> {
        self.ensure_available().await?;
        self.intent.lock().await.set_amount(amount)?;
        debug!("Amount set to {:?}", amount);
        Ok(())
    }

    /// Set or clear the fee ceiling
    pub async fn set_max_fee(&self, max_fee: Option<u64>) -> RebalanceResult<()> {
        self.ensure_available().await?;
        self.intent.lock().await.set_max_fee(max_fee)?;
        debug!("Max fee set to {:?}", max_fee);
        Ok(())
    }

    /// Clear the outgoing (and incoming) channel
    pub async fn reset_outgoing(&self) -> RebalanceResult<()> {
        self.intent.lock().await.reset_outgoing()?;
        info!("Outgoing channel cleared");
        Ok(())
    }

    /// Clear the incoming channel
    pub async fn reset_incoming(&self) -> RebalanceResult<()> {
        self.intent.lock().await.reset_incoming()?;
        info!("Incoming channel cleared");
        Ok(())
    }

    /// Clear the whole selection. Refused while a run is in flight; cancel it instead.
    pub async fn reset_all(&self) -> RebalanceResult<()> {
        let run = self.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.is_finished()) {
            return Err(Rejected::Blocked.into());
        }
        self.intent.lock().await.reset_all();
        info!("Rebalance selection cleared");
        Ok(())
    }

    /// Start the rebalance for the current selection
    pub async fn start(&self) -> RebalanceResult<RunSummary> {
        self.ensure_available().await?;
        let mut slot = self.run.lock().await;
        let run = self.controller.start(&self.intent).await?;
        info!("Rebalance {} started", run.id());
        let summary = run.summary();
        *slot = Some(run);
        Ok(summary)
    }

    /// Request cancellation of the in-flight rebalance
    pub async fn cancel(&self) -> RebalanceResult<RunSummary> {
        let slot = self.run.lock().await;
        match slot.as_ref() {
            Some(run) if run.cancel() => Ok(run.summary()),
            _ => Err(RebalanceError::NoActiveRun),
        }
    }

    /// Wait for the latest run to finish
    pub async fn wait_for_run(&self) -> Option<RunOutcome> {
        let run = self.run.lock().await.clone()?;
        Some(run.wait().await)
    }
}
