//! Audio asset storage behind a narrow upload/delete seam.

use crate::config::CdnConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Where synthesized audio lives. The dispatch engine only ever needs
/// `delete` (campaign teardown); `put` runs once per materialization.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Uploads `bytes` under `key` and returns the public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, VoiceError>;

    /// Removes the object. Unknown keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), VoiceError>;
}

/// HTTP CDN backend: objects are PUT to and served from
/// `{base_url}/{folder}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    client: reqwest::Client,
    config: CdnConfig,
}

impl HttpAssetStore {
    pub fn new(config: CdnConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{key}",
            self.config.base_url.trim_end_matches('/'),
            self.config.folder.trim_matches('/'),
        )
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, VoiceError> {
        let url = self.object_url(key);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, "audio/mpeg")
            .body(bytes)
            .send()
            .await
            .map_err(|e| VoiceError::Cdn(format!("upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(VoiceError::Cdn(format!(
                "upload to {url} returned {}",
                response.status()
            )));
        }

        tracing::debug!(%url, "uploaded audio asset");
        Ok(url)
    }

    async fn delete(&self, key: &str) -> Result<(), VoiceError> {
        let url = self.object_url(key);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| VoiceError::Cdn(format!("delete failed: {e}")))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(VoiceError::Cdn(format!(
                "delete of {url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, VoiceError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), VoiceError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_urls_normalize_separators() {
        let store = HttpAssetStore::new(CdnConfig {
            base_url: "https://cdn.example.com/".to_string(),
            api_key: "k".to_string(),
            folder: "/broadcast-audio/".to_string(),
        });
        assert_eq!(
            store.object_url("abc123"),
            "https://cdn.example.com/broadcast-audio/abc123"
        );
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryAssetStore::new();
        let url = store.put("k1", vec![1, 2, 3]).await.unwrap();
        assert_eq!(url, "memory://k1");
        assert!(store.contains("k1"));

        store.delete("k1").await.unwrap();
        assert!(store.is_empty());
        // Deleting an unknown key is fine.
        store.delete("k1").await.unwrap();
    }
}
