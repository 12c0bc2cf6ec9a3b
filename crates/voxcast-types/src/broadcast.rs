//! Broadcast campaign model: lifecycle status, per-campaign configuration
//! and derived statistics.

use serde::{Deserialize, Serialize};

/// Default concurrent in-flight call bound per campaign.
pub const DEFAULT_MAX_CONCURRENT: u32 = 10;
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay before a failed call becomes eligible again (5 minutes).
pub const DEFAULT_RETRY_DELAY_MS: i64 = 300_000;

/// Campaign lifecycle state.
///
/// Transitions are monotonic: `Draft → Queued → InProgress → Completed`
/// (or `Cancelled` from any non-terminal state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Draft,
    Queued,
    InProgress,
    Completed,
    Cancelled,
}

impl BroadcastStatus {
    /// Stable string form used for persistence and wire payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "queued" => Some(Self::Queued),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Compliance settings applied before any dial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceConfig {
    /// Spoken before the campaign message on every answered call.
    #[serde(default = "default_disclaimer")]
    pub disclaimer_text: String,
    /// Whether the keypress opt-out prompt is offered.
    #[serde(default = "default_true")]
    pub opt_out_enabled: bool,
    /// Whether the external do-not-disturb registry is consulted.
    #[serde(default)]
    pub dnd_respect: bool,
}

fn default_disclaimer() -> String {
    "This is an automated call.".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            disclaimer_text: default_disclaimer(),
            opt_out_enabled: true,
            dnd_respect: false,
        }
    }
}

/// Per-campaign dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastConfig {
    /// Upper bound on calls simultaneously in flight with the provider.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    /// Retries allowed after the first attempt (`attempts ≤ max_retries + 1`).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay in milliseconds before a retryable call is eligible again.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: i64,
    #[serde(default)]
    pub compliance: ComplianceConfig,
}

fn default_max_concurrent() -> u32 {
    DEFAULT_MAX_CONCURRENT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> i64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            compliance: ComplianceConfig::default(),
        }
    }
}

/// Aggregate call counts for a campaign, recomputed from the calls table.
///
/// At rest the non-`total` fields sum to `total`; readers must tolerate
/// transient mismatches while webhooks and dispatch ticks race.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastStats {
    pub total: u64,
    pub queued: u64,
    pub calling: u64,
    pub ringing: u64,
    pub in_progress: u64,
    pub answered: u64,
    pub completed: u64,
    pub failed: u64,
    pub busy: u64,
    pub no_answer: u64,
    pub cancelled: u64,
    pub opted_out: u64,
}

impl BroadcastStats {
    /// Sum of every per-status bucket (excludes `total`).
    pub fn sum(&self) -> u64 {
        self.queued
            + self.calling
            + self.ringing
            + self.in_progress
            + self.answered
            + self.completed
            + self.failed
            + self.busy
            + self.no_answer
            + self.cancelled
            + self.opted_out
    }
}

/// A broadcast campaign as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    pub id: String,
    pub name: String,
    pub message_template: String,
    pub voice: crate::voice::VoiceProfile,
    pub status: BroadcastStatus,
    pub config: BroadcastConfig,
    pub owner_id: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_persisted_form() {
        for status in [
            BroadcastStatus::Draft,
            BroadcastStatus::Queued,
            BroadcastStatus::InProgress,
            BroadcastStatus::Completed,
            BroadcastStatus::Cancelled,
        ] {
            assert_eq!(BroadcastStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BroadcastStatus::parse("bogus"), None);
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        assert!(BroadcastStatus::Completed.is_terminal());
        assert!(BroadcastStatus::Cancelled.is_terminal());
        assert!(!BroadcastStatus::InProgress.is_terminal());
        assert!(!BroadcastStatus::Queued.is_terminal());
    }

    #[test]
    fn config_defaults_match_documented_values() {
        let config = BroadcastConfig::default();
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 300_000);
        assert!(config.compliance.opt_out_enabled);
    }
}
