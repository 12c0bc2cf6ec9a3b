//! Telephony integration: the outbound provider adapter, the fixed
//! provider-to-domain status mapping, the call-time script document, and
//! webhook signature verification.

pub mod config;
pub mod error;
pub mod provider;
pub mod signature;
pub mod status;
pub mod twiml;

pub use config::ProviderConfig;
pub use error::TelephonyError;
pub use provider::{
    HttpTelephonyProvider, PlaceRequest, PlacedCall, TelephonyProvider, ANSWER_TIMEOUT_SECS,
    MACHINE_DETECTION_WINDOW_SECS,
};
pub use signature::{compute_signature, verify_signature, SIGNATURE_HEADER};
pub use status::map_provider_status;
