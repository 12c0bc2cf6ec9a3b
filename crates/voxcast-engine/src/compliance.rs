//! Do-not-disturb registry checks.
//!
//! The registry is advisory and external; an unreachable registry yields
//! `Unchecked`, never a block. The opt-out store check — the second half
//! of the compliance filter — lives in the gateway and runs inside the
//! dial pipeline, after this one.

use async_trait::async_trait;
use std::time::Duration;

/// Result of a DND registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DndOutcome {
    Allowed,
    Blocked,
    /// The registry was not consulted or did not answer.
    Unchecked,
}

impl DndOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
            Self::Unchecked => "unchecked",
        }
    }
}

/// Seam for the external do-not-disturb registry.
#[async_trait]
pub trait DndChecker: Send + Sync {
    async fn check(&self, phone: &str) -> DndOutcome;
}

/// Checker used when no registry is configured: everything is `Unchecked`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDnd;

#[async_trait]
impl DndChecker for NoopDnd {
    async fn check(&self, _phone: &str) -> DndOutcome {
        DndOutcome::Unchecked
    }
}

/// Timeout for registry lookups; the filter must not stall a dial batch.
const DND_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP registry client: `GET {endpoint}?phone=…` returning
/// `{"status": "allowed" | "blocked"}`.
#[derive(Debug, Clone)]
pub struct HttpDndChecker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDndChecker {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl DndChecker for HttpDndChecker {
    async fn check(&self, phone: &str) -> DndOutcome {
        let request = self
            .client
            .get(&self.endpoint)
            .query(&[("phone", phone)])
            .timeout(DND_LOOKUP_TIMEOUT)
            .send();

        let response = match request.await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "dnd registry unreachable");
                return DndOutcome::Unchecked;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "dnd registry error");
            return DndOutcome::Unchecked;
        }

        #[derive(serde::Deserialize)]
        struct DndReply {
            status: String,
        }
        match response.json::<DndReply>().await {
            Ok(reply) if reply.status == "blocked" => DndOutcome::Blocked,
            Ok(reply) if reply.status == "allowed" => DndOutcome::Allowed,
            Ok(reply) => {
                tracing::warn!(status = %reply.status, "unknown dnd registry answer");
                DndOutcome::Unchecked
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed dnd registry answer");
                DndOutcome::Unchecked
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_checker_never_blocks() {
        assert_eq!(NoopDnd.check("+15550001").await, DndOutcome::Unchecked);
    }

    #[test]
    fn outcome_strings_match_persisted_dnd_status() {
        assert_eq!(DndOutcome::Allowed.as_str(), "allowed");
        assert_eq!(DndOutcome::Blocked.as_str(), "blocked");
        assert_eq!(DndOutcome::Unchecked.as_str(), "unchecked");
    }
}
