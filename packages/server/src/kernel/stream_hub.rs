//! In-process pub/sub hub for live crawler status.
//!
//! One broadcast channel per automation config. The orchestrator publishes,
//! SSE endpoints subscribe.
//!
//! # Usage
//!
//! Producers (orchestrator):
//!   hub.publish(AutomationEvent::RunStarted { config_id: 7, .. }).await;
//!
//! Consumers (SSE endpoints):
//!   let rx = hub.subscribe(7).await;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::domains::automation::events::AutomationEvent;

/// Thread-safe, cloneable. Keyed by automation config id.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<i64, broadcast::Sender<AutomationEvent>>>>,
    capacity: usize,
}

impl StreamHub {
    /// Create a new StreamHub with default capacity (256 messages per channel).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish an event to its config's channel. No-op if no subscribers.
    pub async fn publish(&self, event: AutomationEvent) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(&event.config_id()) {
            // Ignore send errors (no active receivers)
            let _ = tx.send(event);
        }
    }

    /// Subscribe to a config's events. Creates the channel if it doesn't exist.
    pub async fn subscribe(&self, config_id: i64) -> broadcast::Receiver<AutomationEvent> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(config_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Remove channels with zero subscribers (housekeeping).
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::automation::state::CrawlerState;

    fn updated(config_id: i64) -> AutomationEvent {
        AutomationEvent::ConfigUpdated {
            config_id,
            enabled: true,
            state: CrawlerState::Active,
            suggested_query: Some("rust engineer".into()),
            suggested_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe(1).await;

        hub.publish(updated(1)).await;

        assert_eq!(rx.recv().await.unwrap(), updated(1));
    }

    #[tokio::test]
    async fn test_events_are_scoped_to_config() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe(1).await;

        hub.publish(updated(2)).await;
        hub.publish(updated(1)).await;

        assert_eq!(rx.recv().await.unwrap().config_id(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_no_subscribers_is_noop() {
        let hub = StreamHub::new();
        hub.publish(updated(99)).await;
    }

    #[tokio::test]
    async fn test_cleanup_removes_empty_channels() {
        let hub = StreamHub::new();
        let rx = hub.subscribe(5).await;

        assert_eq!(hub.channels.read().await.len(), 1);

        drop(rx);
        hub.cleanup().await;

        assert_eq!(hub.channels.read().await.len(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let hub = StreamHub::new();
        let mut rx1 = hub.subscribe(3).await;
        let mut rx2 = hub.subscribe(3).await;

        hub.publish(updated(3)).await;

        assert_eq!(rx1.recv().await.unwrap(), updated(3));
        assert_eq!(rx2.recv().await.unwrap(), updated(3));
    }
}
