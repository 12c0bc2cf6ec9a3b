//! HTTP client for the external TTS service.

use crate::config::TtsConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use voxcast_types::VoiceProfile;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion
/// from oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Words-per-second assumption for the duration estimate when the service
/// reports none.
const WORDS_PER_SECOND: f64 = 2.5;

/// Seam for speech synthesis so the materializer can be exercised without
/// a live TTS service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text` with the given voice, returning raw audio bytes.
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>, VoiceError>;
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    provider: &'a str,
    language: &'a str,
}

/// Client for an HTTP TTS service that accepts JSON and returns raw audio.
#[derive(Debug, Clone)]
pub struct TtsClient {
    client: reqwest::Client,
    config: TtsConfig,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let request = SynthesizeRequest {
            text,
            voice: &voice.voice_id,
            provider: &voice.provider,
            language: &voice.language,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Tts(format!(
                        "TTS request timed out after {} seconds",
                        self.config.timeout_secs
                    ))
                } else {
                    VoiceError::Tts(format!("TTS request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "TTS service returned {status}: {body}"
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(VoiceError::Tts("TTS service returned no audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Estimates spoken duration in whole seconds at ~2.5 words per second.
pub fn estimate_duration_secs(text: &str) -> i64 {
    let words = text.split_whitespace().count();
    (words as f64 / WORDS_PER_SECOND).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_estimate_rounds_up() {
        assert_eq!(estimate_duration_secs("one two three four five"), 2);
        assert_eq!(estimate_duration_secs("one two"), 1);
        assert_eq!(estimate_duration_secs(""), 0);
        // 6 words / 2.5 = 2.4 → 3
        assert_eq!(estimate_duration_secs("a b c d e f"), 3);
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_before_any_request() {
        let client = TtsClient::new(TtsConfig::default());
        let text = "x".repeat(MAX_TTS_INPUT_BYTES + 1);
        let err = client
            .synthesize(&text, &VoiceProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Tts(_)));
    }
}
