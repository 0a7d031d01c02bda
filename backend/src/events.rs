//! In-process fan-out of flushed snapshots to server-sent-event subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use pricing::Snapshot;
use scheduler::{Publisher, TransportError};

/// SSE event name every flushed snapshot is delivered under.
pub const PRICES_EVENT: &str = "prices";

/// One pre-serialized event, shared by every subscriber.
#[derive(Clone, Debug)]
pub struct ServerEvent {
    pub name: &'static str,
    pub data: Arc<str>,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl Publisher for EventBus {
    async fn broadcast(&self, snapshot: Snapshot) -> Result<(), TransportError> {
        let data = serde_json::to_string(&snapshot)
            .map_err(|e| TransportError::Unavailable(format!("encode snapshot: {e}")))?;

        let event = ServerEvent {
            name: PRICES_EVENT,
            data: data.into(),
        };

        let receivers = self
            .tx
            .send(event)
            .map_err(|_| TransportError::NoSubscribers)?;

        debug!(receivers, "snapshot event sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let snapshot = Snapshot {
            spot: Some(3_412.5),
            ..Default::default()
        };
        bus.broadcast(snapshot.clone()).await.unwrap();

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.name, PRICES_EVENT);
            let decoded: Snapshot = serde_json::from_str(&event.data).unwrap();
            assert_eq!(decoded, snapshot);
        }
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_transport_error() {
        let bus = EventBus::new(8);

        let err = bus.broadcast(Snapshot::default()).await.unwrap_err();
        assert!(matches!(err, TransportError::NoSubscribers));

        // Dropped subscribers count as gone.
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.broadcast(Snapshot::default()).await.is_err());
    }
}
