//! Room-scoped event fan-out.
//!
//! The engine only ever sees this trait; the server wires it to a real
//! transport (SSE today). Publishing is fire-and-forget: a full or
//! subscriber-less channel drops the event rather than slowing a dispatch
//! tick or a webhook handler.

use tokio::sync::broadcast;
use voxcast_types::{BroadcastEvent, Envelope};

/// Fan-out seam held by the dispatch engine and the webhook sink.
pub trait Publisher: Send + Sync {
    /// Publishes `event` to every subscriber of `room`. Never blocks.
    fn publish(&self, room: &str, event: BroadcastEvent);
}

/// Publisher backed by a `tokio::sync::broadcast` channel. Subscribers
/// filter envelopes by room; lagging subscribers lose events, by contract.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: broadcast::Sender<Envelope>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// A new subscription to the full envelope stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, room: &str, event: BroadcastEvent) {
        // send only fails when nobody is listening, which is fine.
        let _ = self.tx.send(Envelope {
            room: room.to_string(),
            event,
        });
    }
}

/// Publisher that discards everything. Useful in tests and tooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, _room: &str, _event: BroadcastEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxcast_types::broadcast_room;

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let publisher = ChannelPublisher::new(8);
        publisher.publish(
            &broadcast_room("b-1"),
            BroadcastEvent::CallsCreated {
                broadcast_id: "b-1".to_string(),
                timestamp: 0,
            },
        );
    }

    #[tokio::test]
    async fn subscribers_receive_room_tagged_envelopes() {
        let publisher = ChannelPublisher::new(8);
        let mut rx = publisher.subscribe();

        publisher.publish(
            &broadcast_room("b-1"),
            BroadcastEvent::BroadcastListUpdate { timestamp: 7 },
        );

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.room, "broadcast:b-1");
        assert!(matches!(
            envelope.event,
            BroadcastEvent::BroadcastListUpdate { timestamp: 7 }
        ));
    }
}
