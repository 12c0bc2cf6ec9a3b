//! Speech synthesis and audio materialization.
//!
//! A campaign's message is synthesized exactly once: the template text is
//! hashed, sent to the TTS service, and the resulting audio is uploaded to
//! a public CDN whose URL every dial request references.

pub mod cdn;
pub mod config;
pub mod error;
pub mod materialize;
pub mod tts;

pub use cdn::{AssetStore, HttpAssetStore, MemoryAssetStore};
pub use config::{CdnConfig, TtsConfig};
pub use error::VoiceError;
pub use materialize::{unique_key, Materializer};
pub use tts::{SpeechSynthesizer, TtsClient};
