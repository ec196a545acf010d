//! Channel directory
//!
//! Cached result of the last channel listing. A failed listing is reported
//! through the notifier and leaves the directory `Unavailable`, which the
//! rest of the workflow treats as "no channels".

use crate::node::{Channel, ChannelFilter, ChannelId, NodeApi};
use crate::notify::Notifier;
use serde::Serialize;
use tracing::{info, warn};

/// Directory status as shown to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DirectoryStatus {
    /// Channels were never fetched
    Loading,
    /// Channels are available
    Ready {
        /// Number of channels
        channels: usize,
    },
    /// The last fetch failed
    Unavailable {
        /// Failure reason
        reason: String,
    },
}

#[derive(Debug, Clone, Default)]
enum DirectoryState {
    #[default]
    Loading,
    Ready(Vec<Channel>),
    Unavailable(String),
}

/// The node's channels as last fetched
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    state: DirectoryState,
}

impl ChannelDirectory {
    /// A directory that has not been fetched yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch channels from the node
    pub async fn fetch(node: &dyn NodeApi, filter: ChannelFilter, notifier: &dyn Notifier) -> Self {
        match node.list_channels(filter).await {
            Ok(channels) => {
                info!("Loaded {} channels", channels.len());
                Self {
                    state: DirectoryState::Ready(channels),
                }
            }
            Err(e) => {
                warn!("Failed to load channels: {}", e);
                notifier.notify_error(&format!("Unable to load channels: {}", e));
                Self {
                    state: DirectoryState::Unavailable(e.to_string()),
                }
            }
        }
    }

    /// Channels, empty unless the last fetch succeeded
    pub fn channels(&self) -> &[Channel] {
        match &self.state {
            DirectoryState::Ready(channels) => channels,
            _ => &[],
        }
    }

    /// Look up a channel by ID
    pub fn get(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels().iter().find(|c| &c.id == id)
    }

    /// Current status
    pub fn status(&self) -> DirectoryStatus {
        match &self.state {
            DirectoryState::Loading => DirectoryStatus::Loading,
            DirectoryState::Ready(channels) => DirectoryStatus::Ready {
                channels: channels.len(),
            },
            DirectoryState::Unavailable(reason) => DirectoryStatus::Unavailable {
                reason: reason.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::node::mock::{channel, MockNode};
    use crate::notify::NotificationHub;

    #[tokio::test]
    async fn test_fetch_active_channels() {
        let mut inactive = channel("2", 10, 10);
        inactive.active = false;
        let node = MockNode::new(vec![channel("1", 10, 10), inactive]);
        let hub = NotificationHub::new(&NotificationConfig::default());

        let directory =
            ChannelDirectory::fetch(&node, ChannelFilter { active_only: true }, &hub).await;

        assert_eq!(directory.status(), DirectoryStatus::Ready { channels: 1 });
        assert!(directory.get(&ChannelId::from("1")).is_some());
        assert!(directory.get(&ChannelId::from("2")).is_none());
        assert!(hub.recent().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_unavailable() {
        let node = MockNode::new(vec![channel("1", 10, 10)]);
        node.fail_listing("connection refused");
        let hub = NotificationHub::new(&NotificationConfig::default());

        let directory = ChannelDirectory::fetch(&node, ChannelFilter::default(), &hub).await;

        assert!(matches!(directory.status(), DirectoryStatus::Unavailable { .. }));
        assert!(directory.channels().is_empty());
        assert_eq!(hub.recent().len(), 1);
        assert!(hub.recent()[0].message.contains("connection refused"));
    }

    #[test]
    fn test_new_directory_is_loading() {
        let directory = ChannelDirectory::new();
        assert_eq!(directory.status(), DirectoryStatus::Loading);
        assert!(directory.channels().is_empty());
    }
}
