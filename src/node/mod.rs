//! Lightning node integration module
//!
//! This module defines the interface the rebalancer consumes from the node
//! ([`NodeApi`]) together with the data it exchanges, and provides a REST
//! client for LND-compatible nodes.

use crate::RebalanceResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::NodeClient;

/// Node operations the rebalancer depends on
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Version of the node software
    async fn get_node_version(&self) -> RebalanceResult<NodeVersion>;

    /// List the node's open channels
    async fn list_channels(&self, filter: ChannelFilter) -> RebalanceResult<Vec<Channel>>;

    /// Move liquidity from one channel to another with a circular payment.
    ///
    /// Implementations must watch `cancel` and, once it fires, stop the attempt
    /// and return [`RebalanceReply::Cancelled`] after the node acknowledged it.
    /// A failed attempt is reported as `Err` carrying the node's reason.
    async fn rebalance(
        &self,
        request: RebalanceRequest,
        cancel: CancellationToken,
    ) -> RebalanceResult<RebalanceReply>;
}

/// Channel identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        ChannelId(id.to_string())
    }
}

/// An open payment channel as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID
    pub id: ChannelId,
    /// Public key of the channel partner
    pub partner_public_key: String,
    /// Channel capacity in satoshis
    pub capacity: u64,
    /// Balance on our side in satoshis
    pub local_balance: u64,
    /// Balance on the partner's side in satoshis
    pub remote_balance: u64,
    /// Channel is currently usable for payments
    pub active: bool,
    /// Channel is not announced to the network
    pub private: bool,
}

impl Channel {
    /// Local balance as a rounded percentage of the channel's total balance
    pub fn balance_ratio(&self) -> u8 {
        crate::balance::balance_ratio(self.local_balance, self.remote_balance)
    }
}

/// Filter for channel listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelFilter {
    /// Only return active channels
    pub active_only: bool,
}

/// Node software version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Version string as reported by the node
    pub raw: String,
}

impl NodeVersion {
    /// Parse a version string such as `"0.9.0-beta commit=v0.9.0-beta"`
    pub fn parse(raw: &str) -> Option<Self> {
        let core = raw
            .split_whitespace()
            .next()?
            .trim_start_matches('v')
            .split('-')
            .next()?;

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };

        Some(Self {
            major,
            minor,
            patch,
            raw: raw.to_string(),
        })
    }
}

impl std::fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A rebalance as sent to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceRequest {
    /// Channel the payment leaves through
    pub outgoing_channel_id: ChannelId,
    /// Channel the payment comes back through
    pub incoming_channel_id: ChannelId,
    /// Amount to move in satoshis
    pub amount_sats: u64,
    /// Routing fee ceiling in satoshis; `None` searches all routes
    pub max_fee_sats: Option<u64>,
}

/// Result of a completed rebalance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebalanceReceipt {
    /// Amount routed in satoshis
    pub routed_sats: u64,
    /// Routing fee paid in satoshis
    pub fee_sats: u64,
}

/// Reply of the node to a rebalance request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceReply {
    /// The circular payment went through
    Routed(RebalanceReceipt),
    /// The attempt was stopped after a cancellation request
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_version() {
        let version = NodeVersion::parse("0.9.0-beta commit=v0.9.0-beta").unwrap();
        assert_eq!((version.major, version.minor, version.patch), (0, 9, 0));

        let version = NodeVersion::parse("0.17.4-beta").unwrap();
        assert_eq!(version.minor, 17);
        assert_eq!(version.to_string(), "0.17.4");

        let version = NodeVersion::parse("v0.8").unwrap();
        assert_eq!((version.minor, version.patch), (8, 0));

        assert!(NodeVersion::parse("").is_none());
        assert!(NodeVersion::parse("unknown").is_none());
    }

    #[test]
    fn test_channel_balance_ratio() {
        let channel = Channel {
            id: ChannelId::from("1"),
            partner_public_key: String::new(),
            capacity: 10_000,
            local_balance: 7_500,
            remote_balance: 2_500,
            active: true,
            private: false,
        };
        assert_eq!(channel.balance_ratio(), 75);
    }
}
