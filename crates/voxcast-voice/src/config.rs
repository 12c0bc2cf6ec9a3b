use serde::{Deserialize, Serialize};
use std::fmt;

fn default_tts_timeout_secs() -> u64 {
    30
}

fn default_cdn_folder() -> String {
    "broadcast-audio".to_string()
}

/// TTS service endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// HTTP endpoint accepting `{text, voice, provider, language}` and
    /// returning raw audio bytes.
    pub endpoint: String,
    /// Synthesis timeout in seconds. Default: 30.
    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5002/synthesize".to_string(),
            timeout_secs: default_tts_timeout_secs(),
        }
    }
}

/// CDN upload configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// Public base URL objects are served from.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Folder prefix for broadcast audio objects.
    #[serde(default = "default_cdn_folder")]
    pub folder: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            folder: default_cdn_folder(),
        }
    }
}

impl fmt::Debug for CdnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("folder", &self.folder)
            .finish()
    }
}
