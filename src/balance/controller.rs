//! Rebalance execution controller
//!
//! [`RebalanceController::start`] commits a ready intent and runs the
//! rebalance as a background task. The returned [`RebalanceRun`] is the handle
//! for that task: it can request cancellation and observe the outcome. Every
//! terminal outcome resets the intent, so the selection is always usable
//! again once a run ends.

use crate::{
    balance::selection::{RebalanceIntent, RebalanceOrder, Rejected},
    format::{format_amount, Unit},
    node::{NodeApi, RebalanceReply, RebalanceRequest},
    notify::Notifier,
    RebalanceError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Liquidity was moved
    Success {
        /// Amount routed in satoshis
        routed_sats: u64,
        /// Fee paid in satoshis
        fee_sats: u64,
    },
    /// The operator cancelled and the node acknowledged
    Cancelled,
    /// The node could not complete the rebalance
    Failed {
        /// Reason reported by the node
        reason: String,
    },
}

/// Observable status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for the node
    Running,
    /// Cancellation requested, waiting for the node to acknowledge
    Cancelling,
    /// Finished with an outcome
    Finished(RunOutcome),
}

/// Serializable view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run ID
    pub id: Uuid,
    /// Outgoing channel ID
    pub outgoing_channel_id: String,
    /// Incoming channel ID
    pub incoming_channel_id: String,
    /// Amount in satoshis
    pub amount_sats: u64,
    /// Fee ceiling in satoshis
    pub max_fee_sats: Option<u64>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Current status
    pub status: RunStatus,
}

/// Starts rebalances and reports their outcome
#[derive(Clone)]
pub struct RebalanceController {
    /// Node backend
    node: Arc<dyn NodeApi>,
    /// Notification sink
    notifier: Arc<dyn Notifier>,
}

impl RebalanceController {
    /// Create a new controller
    pub fn new(node: Arc<dyn NodeApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self { node, notifier }
    }

    /// Commit a ready intent and start the rebalance in the background.
    ///
    /// Refused unless outgoing, incoming and amount are all set and no other
    /// run holds the intent.
    pub async fn start(&self, intent: &Arc<Mutex<RebalanceIntent>>) -> Result<RebalanceRun, Rejected> {
        let order = intent.lock().await.commit()?;

        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        info!(
            "Starting rebalance {}: {} sats from {} to {} (max fee: {:?})",
            id, order.amount_sats, order.outgoing.id, order.incoming.id, order.max_fee_sats
        );

        let request = order.to_request();
        let node = self.node.clone();
        let notifier = self.notifier.clone();
        let intent = intent.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            let attempt = tokio::spawn(execute(node, notifier.clone(), request, task_token));
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Rebalance task {} aborted: {}", id, e);
                    let reason = "rebalance task stopped unexpectedly".to_string();
                    notifier.notify_error(&format!("Error balancing channel: {}", reason));
                    RunOutcome::Failed { reason }
                }
            };

            info!("Rebalance {} finished: {:?}", id, outcome);
            // Publish and reset under the intent lock so no one sees a reset intent with a live run
            let mut intent = intent.lock().await;
            outcome_tx.send_replace(Some(outcome));
            intent.reset_all();
        });

        Ok(RebalanceRun {
            id,
            order,
            started_at: Utc::now(),
            token,
            outcome: outcome_rx,
        })
    }
}

async fn execute(
    node: Arc<dyn NodeApi>,
    notifier: Arc<dyn Notifier>,
    request: RebalanceRequest,
    token: CancellationToken,
) -> RunOutcome {
    match node.rebalance(request, token.clone()).await {
        Ok(RebalanceReply::Routed(receipt)) => {
            notifier.notify_success(&format!(
                "Balanced channels: moved {} for {} in fees",
                format_amount(receipt.routed_sats, Unit::Sat),
                format_amount(receipt.fee_sats, Unit::Sat)
            ));
            RunOutcome::Success {
                routed_sats: receipt.routed_sats,
                fee_sats: receipt.fee_sats,
            }
        }
        Ok(RebalanceReply::Cancelled) => RunOutcome::Cancelled,
        Err(e) if token.is_cancelled() => {
            warn!("Rebalance stopped after cancellation: {}", e);
            RunOutcome::Cancelled
        }
        Err(e) => {
            let reason = match e {
                RebalanceError::Rebalance(reason) => reason,
                other => other.to_string(),
            };
            notifier.notify_error(&format!("Error balancing channel: {}", reason));
            RunOutcome::Failed { reason }
        }
    }
}

/// Handle of a started rebalance
#[derive(Debug, Clone)]
pub struct RebalanceRun {
    id: Uuid,
    order: RebalanceOrder,
    started_at: DateTime<Utc>,
    token: CancellationToken,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl RebalanceRun {
    /// Run ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the node to stop the attempt. Returns false if the run already finished.
    pub fn cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        info!("Cancellation requested for rebalance {}", self.id);
        self.token.cancel();
        true
    }

    /// Whether the run reached a terminal outcome
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Current status
    pub fn status(&self) -> RunStatus {
        match &*self.outcome.borrow() {
            Some(outcome) => RunStatus::Finished(outcome.clone()),
            None if self.token.is_cancelled() => RunStatus::Cancelling,
            None => RunStatus::Running,
        }
    }

    /// Wait for the terminal outcome
    pub async fn wait(&self) -> RunOutcome {
        let mut rx = self.outcome.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| RunOutcome::Failed {
            reason: "rebalance task ended without an outcome".to_string(),
        })
    }

    /// Serializable view
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            outgoing_channel_id: self.order.outgoing.id.to_string(),
            incoming_channel_id: self.order.incoming.id.to_string(),
            amount_sats: self.order.amount_sats,
            max_fee_sats: self.order.max_fee_sats,
            started_at: self.started_at,
            status: self.status(),
        }
    }
}
