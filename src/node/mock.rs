//! Scripted in-memory node used by tests

use crate::{
    node::{
        Channel, ChannelFilter, ChannelId, NodeApi, NodeVersion, RebalanceReceipt,
        RebalanceReply, RebalanceRequest,
    },
    RebalanceError, RebalanceResult,
};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How the mock answers a rebalance request
#[derive(Debug, Clone)]
pub enum Script {
    /// Route immediately with the given fee
    Route { fee_sats: u64 },
    /// Fail immediately with the given reason
    Fail(String),
    /// Wait until released or cancelled
    Hang,
}

pub struct MockNode {
    version: Mutex<Result<NodeVersion, String>>,
    channels: Mutex<Result<Vec<Channel>, String>>,
    script: Mutex<Script>,
    requests: Mutex<Vec<RebalanceRequest>>,
    started: Notify,
    release: Notify,
}

impl MockNode {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            version: Mutex::new(Ok(NodeVersion::parse("0.9.0-beta").unwrap())),
            channels: Mutex::new(Ok(channels)),
            script: Mutex::new(Script::Route { fee_sats: 1 }),
            requests: Mutex::new(Vec::new()),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn with_version(self, raw: &str) -> Self {
        *self.version.lock().unwrap() = Ok(NodeVersion::parse(raw).unwrap());
        self
    }

    pub fn with_script(self, script: Script) -> Self {
        *self.script.lock().unwrap() = script;
        self
    }

    /// Answer version queries the way the client does for an unrecognized version
    pub fn fail_version(&self, reason: &str) {
        *self.version.lock().unwrap() = Err(reason.to_string());
    }

    pub fn fail_listing(&self, reason: &str) {
        *self.channels.lock().unwrap() = Err(reason.to_string());
    }

    pub fn requests(&self) -> Vec<RebalanceRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Resolves once a request reached the node
    pub async fn started(&self) {
        self.started.notified().await
    }

    /// Let a hanging request route
    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub fn channel(id: &str, local: u64, remote: u64) -> Channel {
    Channel {
        id: ChannelId::from(id),
        partner_public_key: format!("02{:0>64}", id),
        capacity: local + remote,
        local_balance: local,
        remote_balance: remote,
        active: true,
        private: false,
    }
}

#[async_trait]
impl NodeApi for MockNode {
    async fn get_node_version(&self) -> RebalanceResult<NodeVersion> {
        self.version
            .lock()
            .unwrap()
            .clone()
            .map_err(RebalanceError::Node)
    }

    async fn list_channels(&self, filter: ChannelFilter) -> RebalanceResult<Vec<Channel>> {
        match &*self.channels.lock().unwrap() {
            Ok(channels) => Ok(channels
                .iter()
                .filter(|c| !filter.active_only || c.active)
                .cloned()
                .collect()),
            Err(reason) => Err(RebalanceError::Transport(reason.clone())),
        }
    }

    async fn rebalance(
        &self,
        request: RebalanceRequest,
        cancel: CancellationToken,
    ) -> RebalanceResult<RebalanceReply> {
        let amount = request.amount_sats;
        self.requests.lock().unwrap().push(request);
        self.started.notify_one();

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Route { fee_sats } => Ok(RebalanceReply::Routed(RebalanceReceipt {
                routed_sats: amount,
                fee_sats,
            })),
            Script::Fail(reason) => Err(RebalanceError::Rebalance(reason)),
            Script::Hang => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(RebalanceReply::Cancelled),
                    _ = self.release.notified() => Ok(RebalanceReply::Routed(RebalanceReceipt {
                        routed_sats: amount,
                        fee_sats: 0,
                    })),
                }
            }
        }
    }
}
