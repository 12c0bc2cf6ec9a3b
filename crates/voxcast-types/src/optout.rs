//! Global opt-out records, keyed by phone number.

use serde::{Deserialize, Serialize};

/// How an opt-out record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptOutSource {
    /// The callee pressed the opt-out digit during a broadcast call.
    BroadcastKeypress,
    /// Entered by an operator.
    Manual,
    /// Imported from a do-not-disturb registry.
    DndRegistry,
    /// Created through the HTTP API.
    Api,
}

impl OptOutSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BroadcastKeypress => "broadcast_keypress",
            Self::Manual => "manual",
            Self::DndRegistry => "dnd_registry",
            Self::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "broadcast_keypress" => Some(Self::BroadcastKeypress),
            "manual" => Some(Self::Manual),
            "dnd_registry" => Some(Self::DndRegistry),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

/// A phone number that must not receive broadcast calls while the record
/// is active (`expires_at > now`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOut {
    pub phone: String,
    pub source: OptOutSource,
    /// Epoch milliseconds.
    pub opted_out_at: i64,
    pub expires_at: i64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trips_through_persisted_form() {
        for source in [
            OptOutSource::BroadcastKeypress,
            OptOutSource::Manual,
            OptOutSource::DndRegistry,
            OptOutSource::Api,
        ] {
            assert_eq!(OptOutSource::parse(source.as_str()), Some(source));
        }
    }
}
