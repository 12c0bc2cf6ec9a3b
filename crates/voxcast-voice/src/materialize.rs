//! Single-shot audio materialization: hash, synthesize, upload.

use crate::cdn::AssetStore;
use crate::error::VoiceError;
use crate::tts::{estimate_duration_secs, SpeechSynthesizer};
use md5::{Digest, Md5};
use std::sync::Arc;
use voxcast_types::{AudioAsset, VoiceProfile};

/// Content key for a template text: hex MD5.
pub fn unique_key(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turns campaign text into a CDN-hosted audio asset.
///
/// Callers are expected to check the campaign for an already-attached asset
/// with the same [`unique_key`] first; materialization itself always
/// synthesizes and uploads.
pub struct Materializer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    assets: Arc<dyn AssetStore>,
}

impl Materializer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            synthesizer,
            assets,
        }
    }

    /// Synthesizes `text` and uploads it, returning the asset record to
    /// attach to the campaign. `now` is epoch milliseconds.
    pub async fn materialize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        now: i64,
    ) -> Result<AudioAsset, VoiceError> {
        let key = unique_key(text);
        let audio = self.synthesizer.synthesize(text, voice).await?;
        tracing::info!(key = %key, bytes = audio.len(), "synthesized campaign audio");

        let audio_url = self.assets.put(&key, audio).await?;

        Ok(AudioAsset {
            unique_key: key,
            text: text.to_string(),
            audio_url,
            duration_secs: estimate_duration_secs(text),
            generated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::MemoryAssetStore;
    use async_trait::async_trait;

    struct CannedSynth;

    #[async_trait]
    impl SpeechSynthesizer for CannedSynth {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceProfile,
        ) -> Result<Vec<u8>, VoiceError> {
            Ok(vec![0u8; 16])
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl SpeechSynthesizer for FailingSynth {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceProfile,
        ) -> Result<Vec<u8>, VoiceError> {
            Err(VoiceError::Tts("service down".to_string()))
        }
    }

    #[test]
    fn unique_key_is_stable_md5_hex() {
        assert_eq!(unique_key("hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(unique_key("hello"), unique_key("hello"));
        assert_ne!(unique_key("hello"), unique_key("hello "));
    }

    #[tokio::test]
    async fn materialize_uploads_under_the_content_key() {
        let store = Arc::new(MemoryAssetStore::new());
        let materializer = Materializer::new(Arc::new(CannedSynth), store.clone());

        let asset = materializer
            .materialize("Hi there friend", &VoiceProfile::default(), 1_000)
            .await
            .unwrap();

        assert_eq!(asset.unique_key, unique_key("Hi there friend"));
        assert!(store.contains(&asset.unique_key));
        assert_eq!(asset.audio_url, format!("memory://{}", asset.unique_key));
        assert_eq!(asset.duration_secs, 2);
        assert_eq!(asset.generated_at, 1_000);
    }

    #[tokio::test]
    async fn synthesis_failure_uploads_nothing() {
        let store = Arc::new(MemoryAssetStore::new());
        let materializer = Materializer::new(Arc::new(FailingSynth), store.clone());

        let err = materializer
            .materialize("Hi", &VoiceProfile::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Tts(_)));
        assert!(store.is_empty());
    }
}
