//! Call model: one dial attempt pipeline against one contact.

use serde::{Deserialize, Serialize};

/// Per-call state.
///
/// Observed transitions are monotonic: `Queued → Calling → (Ringing →
/// Answered)? → terminal`. The rank ordering below backs the compare-and-set
/// in the persistence gateway so a late dispatch-side update can never
/// regress a state the webhook has already advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Calling,
    Ringing,
    InProgress,
    Answered,
    Completed,
    Failed,
    Busy,
    NoAnswer,
    Cancelled,
    OptedOut,
}

impl CallStatus {
    /// Stable string form used for persistence and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Calling => "calling",
            Self::Ringing => "ringing",
            Self::InProgress => "in_progress",
            Self::Answered => "answered",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no_answer",
            Self::Cancelled => "cancelled",
            Self::OptedOut => "opted_out",
        }
    }

    /// Parses the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "calling" => Some(Self::Calling),
            "ringing" => Some(Self::Ringing),
            "in_progress" => Some(Self::InProgress),
            "answered" => Some(Self::Answered),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "busy" => Some(Self::Busy),
            "no_answer" => Some(Self::NoAnswer),
            "cancelled" => Some(Self::Cancelled),
            "opted_out" => Some(Self::OptedOut),
            _ => None,
        }
    }

    /// Terminal states accept no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::OptedOut
        )
    }

    /// Position in the monotonic progression. Higher ranks never yield to
    /// lower ones.
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Calling => 1,
            Self::Ringing => 2,
            Self::InProgress => 3,
            Self::Answered => 4,
            Self::Busy | Self::NoAnswer => 5,
            Self::Completed | Self::Failed | Self::Cancelled | Self::OptedOut => 6,
        }
    }

    /// States counted against the per-campaign concurrency bound.
    pub const ACTIVE: [CallStatus; 4] = [
        Self::Calling,
        Self::Ringing,
        Self::InProgress,
        Self::Answered,
    ];

    /// States that keep a campaign from completing: everything queued plus
    /// everything still in flight with the provider.
    pub const PENDING: [CallStatus; 5] = [
        Self::Queued,
        Self::Calling,
        Self::Ringing,
        Self::InProgress,
        Self::Answered,
    ];
}

/// One entry of the campaign contact list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub phone: String,
    #[serde(default)]
    pub name: String,
    /// Extra template variables, e.g. `{"account": "1234"}`.
    #[serde(default)]
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

/// A call row as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: String,
    pub broadcast_id: String,
    pub contact: Contact,
    /// Template rendered against this contact.
    pub message_text: String,
    pub audio_url: Option<String>,
    /// Identifier the telephony provider assigned once the call was placed.
    pub provider_sid: Option<String>,
    pub status: CallStatus,
    pub attempts: u32,
    /// Epoch ms after which a queued retry becomes eligible.
    pub retry_after: Option<i64>,
    pub duration_secs: Option<i64>,
    pub start_time: Option<i64>,
    pub answer_time: Option<i64>,
    pub end_time: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Outcome of the do-not-disturb check: `allowed`, `blocked` or
    /// `unchecked`.
    pub dnd_status: String,
    pub opted_out: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_persisted_form() {
        for s in [
            "queued",
            "calling",
            "ringing",
            "in_progress",
            "answered",
            "completed",
            "failed",
            "busy",
            "no_answer",
            "cancelled",
            "opted_out",
        ] {
            let parsed = CallStatus::parse(s).expect("known status");
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn terminal_states_outrank_everything_in_flight() {
        for terminal in [
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::Cancelled,
            CallStatus::OptedOut,
        ] {
            assert!(terminal.is_terminal());
            for live in CallStatus::PENDING {
                assert!(terminal.rank() > live.rank());
            }
        }
    }

    #[test]
    fn active_states_are_a_subset_of_pending() {
        for s in CallStatus::ACTIVE {
            assert!(CallStatus::PENDING.contains(&s));
        }
        assert!(!CallStatus::ACTIVE.contains(&CallStatus::Queued));
    }
}
