//! Live event payloads fanned out to dashboard subscribers.
//!
//! Events are room-scoped: per-campaign updates go to `broadcast:{id}`,
//! list-level notifications to the global room. Payloads are values, not
//! references — an envelope is cloned per subscriber and carries no shared
//! mutable state.

use crate::broadcast::{BroadcastStats, BroadcastStatus};
use crate::call::CallStatus;
use serde::Serialize;

/// Room shared by list-level and platform-wide events.
pub const GLOBAL_ROOM: &str = "broadcasts";

/// Room carrying the per-campaign event stream.
pub fn broadcast_room(broadcast_id: &str) -> String {
    format!("broadcast:{broadcast_id}")
}

/// One call changed state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUpdate {
    pub broadcast_id: String,
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    pub phone: String,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Campaign-level status or statistics changed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastUpdate {
    pub broadcast_id: String,
    pub status: BroadcastStatus,
    pub stats: BroadcastStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_calls: Option<u64>,
    pub timestamp: i64,
}

/// Event fanned out to room subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BroadcastEvent {
    CallUpdate(CallUpdate),
    BroadcastUpdate(BroadcastUpdate),
    /// Emitted once, after the campaign's call rows are persisted.
    CallsCreated {
        #[serde(rename = "broadcastId")]
        broadcast_id: String,
        timestamp: i64,
    },
    /// Platform-wide statistics changed.
    StatsUpdate { timestamp: i64 },
    /// The campaign list changed (created, cancelled, deleted).
    BroadcastListUpdate { timestamp: i64 },
}

/// A room-addressed event as it travels over the fan-out bus.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub room: String,
    #[serde(flatten)]
    pub event: BroadcastEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_update_serializes_with_wire_field_names() {
        let event = BroadcastEvent::CallUpdate(CallUpdate {
            broadcast_id: "b-1".to_string(),
            call_id: "c-1".to_string(),
            call_sid: Some("CA123".to_string()),
            phone: "+15550001".to_string(),
            status: CallStatus::Calling,
            duration: None,
            timestamp: 1_700_000_000_000,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "call_update");
        assert_eq!(value["data"]["broadcastId"], "b-1");
        assert_eq!(value["data"]["callSid"], "CA123");
        assert_eq!(value["data"]["status"], "calling");
        assert!(value["data"].get("duration").is_none());
    }

    #[test]
    fn rooms_are_scoped_per_campaign() {
        assert_eq!(broadcast_room("abc"), "broadcast:abc");
        assert_ne!(broadcast_room("abc"), GLOBAL_ROOM);
    }
}
