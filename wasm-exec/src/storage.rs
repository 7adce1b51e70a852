use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::{error::Error, Result};

/// Object-storage collaborator for oversized outputs.
///
/// Implementations are process-wide shared resources, safe for concurrent
/// use by independent runs, and hold no per-submission state.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `content` under `key`, publicly retrievable, and return the
    /// public URL. Storing the same key twice is idempotent.
    async fn put(&self, key: &str, content: &[u8]) -> Result<String>;
}

/// Google Cloud Storage over its JSON API.
/// `predefinedAcl=publicRead` marks each object publicly retrievable at
/// the well-known URL.
pub struct HttpObjectStore {
    client: reqwest::Client,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bucket: bucket.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, content: &[u8]) -> Result<String> {
        let upload_url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}&predefinedAcl=publicRead",
            self.bucket, key
        );

        let mut request = self.client.post(&upload_url).body(content.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Storage(e.to_string()))?;

        let object: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("malformed upload response: {e}")))?;
        if object.get("name").and_then(|n| n.as_str()) != Some(key) {
            return Err(Error::Storage(format!(
                "upload response does not name object {key:?}"
            )));
        }

        debug!(bucket = %self.bucket, %key, bytes = content.len(), "stored oversized output");
        Ok(format!(
            "https://storage.googleapis.com/{}/{}",
            self.bucket, key
        ))
    }
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, content: &[u8]) -> Result<String> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), content.to_vec());
        Ok(format!("memory://{key}"))
    }
}
