//! Operator notifications
//!
//! The rebalance workflow reports success and failure through the
//! fire-and-forget [`Notifier`] trait. [`NotificationHub`] is the concrete
//! sink: it logs each notification, keeps a short history for polling
//! clients and fans notifications out to live subscribers.

use crate::config::NotificationConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Fire-and-forget sink for user-visible notifications
pub trait Notifier: Send + Sync {
    /// Report a successful operation
    fn notify_success(&self, message: &str);

    /// Report a failed operation
    fn notify_error(&self, message: &str);
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
}

/// A single notification
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Notification ID
    pub id: Uuid,
    /// Severity
    pub level: NotificationLevel,
    /// Message shown to the operator
    pub message: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Notification sink with history and broadcast
pub struct NotificationHub {
    /// Recent notifications, oldest first
    history: Mutex<VecDeque<Notification>>,
    /// Maximum history length
    history_size: usize,
    /// Broadcast channel for subscribers
    broadcast_tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    /// Create a new notification hub
    pub fn new(config: &NotificationConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_size)),
            history_size: config.history_size.max(1),
            broadcast_tx,
        }
    }

    /// Subscribe to notifications emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.broadcast_tx.subscribe()
    }

    /// Recent notifications, newest first
    pub fn recent(&self) -> Vec<Notification> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().cloned().collect()
    }

    fn emit(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Success => info!("Notification: {}", message),
            NotificationLevel::Error => error!("Notification: {}", message),
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            level,
            message: message.to_string(),
            created_at: Utc::now(),
        };

        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == self.history_size {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        // No subscribers is fine; the history still has it
        if self.broadcast_tx.send(notification).is_err() {
            debug!("No live notification subscribers");
        }
    }
}

impl Notifier for NotificationHub {
    fn notify_success(&self, message: &str) {
        self.emit(NotificationLevel::Success, message);
    }

    fn notify_error(&self, message: &str) {
        self.emit(NotificationLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(history_size: usize) -> NotificationHub {
        NotificationHub::new(&NotificationConfig {
            history_size,
            channel_capacity: 8,
        })
    }

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let hub = hub(2);
        hub.notify_success("one");
        hub.notify_error("two");
        hub.notify_success("three");

        let recent = hub.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "three");
        assert_eq!(recent[1].message, "two");
        assert_eq!(recent[1].level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let hub = hub(4);
        let mut rx = hub.subscribe();

        hub.notify_error("no_route");

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
        assert_eq!(notification.message, "no_route");
    }
}
