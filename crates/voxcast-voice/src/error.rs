use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    /// The TTS service refused or failed the synthesis request.
    #[error("TTS error: {0}")]
    Tts(String),

    /// The CDN refused or failed the upload.
    #[error("CDN error: {0}")]
    Cdn(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
