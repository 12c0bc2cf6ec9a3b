use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelephonyError {
    /// The provider accepted the request but refused the call.
    #[error("provider rejected call ({code}): {message}")]
    Rejected { code: String, message: String },

    /// The provider could not be reached at all.
    #[error("provider unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
