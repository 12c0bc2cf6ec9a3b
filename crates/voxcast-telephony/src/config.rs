use serde::{Deserialize, Serialize};
use std::fmt;

/// Telephony provider account configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider REST API base, e.g. `https://api.telephony.example/2010-04-01`.
    pub api_base: String,
    pub account_id: String,
    #[serde(skip_serializing)]
    pub auth_token: String,
    /// Originating phone number, fixed per tenant.
    pub from_number: String,
    /// Shared secret for webhook signature verification.
    #[serde(skip_serializing)]
    pub signing_secret: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            account_id: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            signing_secret: String::new(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("signing_secret", &"[REDACTED]")
            .finish()
    }
}
