//! Voice profile selection for synthesized campaign audio.

use serde::{Deserialize, Serialize};

/// Identifies the TTS voice a campaign is synthesized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    /// Upstream synthesis provider, e.g. `"polly"` or `"elevenlabs"`.
    pub provider: String,
    /// Provider-specific voice identifier.
    pub voice_id: String,
    /// BCP 47 language tag.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            provider: "polly".to_string(),
            voice_id: "Joanna".to_string(),
            language: default_language(),
        }
    }
}

/// Synthesized campaign audio, deduplicated by the MD5 of its source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAsset {
    /// Hex MD5 of the template text.
    pub unique_key: String,
    pub text: String,
    pub audio_url: String,
    pub duration_secs: i64,
    /// Epoch milliseconds.
    pub generated_at: i64,
}
