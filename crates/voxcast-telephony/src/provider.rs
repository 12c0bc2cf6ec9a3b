//! Outbound call placement against the provider's REST API.

use crate::config::ProviderConfig;
use crate::error::TelephonyError;
use async_trait::async_trait;
use serde::Deserialize;

/// Seconds the provider lets the call ring before giving up.
pub const ANSWER_TIMEOUT_SECS: u32 = 25;

/// Seconds the provider spends deciding human-vs-machine after pickup.
pub const MACHINE_DETECTION_WINDOW_SECS: u32 = 4;

/// Everything the provider needs to place one call. The script itself is
/// never inlined — the provider fetches it from `script_url` at call time.
#[derive(Debug, Clone)]
pub struct PlaceRequest {
    /// Destination phone number.
    pub to: String,
    /// URL the provider fetches the call-time script document from.
    pub script_url: String,
    /// URL lifecycle events are POSTed to, keyed by the internal call id.
    pub status_callback_url: String,
}

/// Provider response to a successful dial request.
#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub provider_sid: String,
    pub provider_status: String,
}

/// The narrow seam the dispatch engine dials through.
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Places an outbound call. Returns the provider's call identifier.
    async fn place(&self, request: &PlaceRequest) -> Result<PlacedCall, TelephonyError>;

    /// Forces an in-flight call to `completed`.
    async fn terminate(&self, provider_sid: &str) -> Result<(), TelephonyError>;

    /// Fetches the provider-side status string for a call.
    async fn fetch_status(&self, provider_sid: &str) -> Result<String, TelephonyError>;
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// REST implementation against a Twilio-shaped provider API.
#[derive(Debug, Clone)]
pub struct HttpTelephonyProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpTelephonyProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id
        )
    }

    fn call_url(&self, sid: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{sid}.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id
        )
    }

    async fn rejection(response: reqwest::Response) -> TelephonyError {
        let status = response.status();
        let body: ProviderErrorBody = response.json().await.unwrap_or(ProviderErrorBody {
            code: None,
            message: None,
        });
        TelephonyError::Rejected {
            code: body
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: body
                .message
                .unwrap_or_else(|| "provider returned no error detail".to_string()),
        }
    }
}

#[async_trait]
impl TelephonyProvider for HttpTelephonyProvider {
    async fn place(&self, request: &PlaceRequest) -> Result<PlacedCall, TelephonyError> {
        let timeout = ANSWER_TIMEOUT_SECS.to_string();
        let amd_timeout = MACHINE_DETECTION_WINDOW_SECS.to_string();
        let form = [
            ("To", request.to.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Url", request.script_url.as_str()),
            ("Method", "GET"),
            ("StatusCallback", request.status_callback_url.as_str()),
            ("StatusCallbackMethod", "POST"),
            ("Timeout", timeout.as_str()),
            ("MachineDetection", "Enable"),
            ("MachineDetectionTimeout", amd_timeout.as_str()),
        ];

        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_id, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let resource: CallResource = response.json().await?;
        tracing::debug!(sid = %resource.sid, to = %request.to, "placed call");
        Ok(PlacedCall {
            provider_sid: resource.sid,
            provider_status: resource.status,
        })
    }

    async fn terminate(&self, provider_sid: &str) -> Result<(), TelephonyError> {
        let response = self
            .client
            .post(self.call_url(provider_sid))
            .basic_auth(&self.config.account_id, Some(&self.config.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(())
    }

    async fn fetch_status(&self, provider_sid: &str) -> Result<String, TelephonyError> {
        let response = self
            .client
            .get(self.call_url(provider_sid))
            .basic_auth(&self.config.account_id, Some(&self.config.auth_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let resource: CallResource = response.json().await?;
        Ok(resource.status)
    }
}
