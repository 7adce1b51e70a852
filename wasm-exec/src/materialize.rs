use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::{
    storage::ObjectStore,
    types::{DeliveredResult, ExecutionResult, Submission},
    Result,
};

/// Default inline-vs-offload threshold, in bytes.
pub const DEFAULT_SIZE_THRESHOLD: usize = 128;

/// Content-addressed storage key: SHA-256 of the submission source.
///
/// Hashing the source alone (not submitter metadata) makes byte-identical
/// submissions resolve to the same key, deduplicating repeated large outputs.
pub fn storage_key(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Result materializer: a pure, side-effecting projection from an
/// `ExecutionResult` to the caller-facing payload. Performs no execution
/// logic.
pub struct Materializer {
    store: Arc<dyn ObjectStore>,
    size_threshold: usize,
}

impl Materializer {
    pub fn new(store: Arc<dyn ObjectStore>, size_threshold: usize) -> Self {
        Self {
            store,
            size_threshold,
        }
    }

    /// Return the visible output inline if it is at or below the threshold,
    /// otherwise store it and return the retrieval reference.
    pub async fn materialize(
        &self,
        submission: &Submission,
        result: &ExecutionResult,
    ) -> Result<DeliveredResult> {
        let visible = result.visible();
        if visible.len() <= self.size_threshold {
            return Ok(DeliveredResult::Inline(visible.to_owned()));
        }

        let key = storage_key(&submission.source);
        let url = self.store.put(&key, visible.as_bytes()).await?;
        Ok(DeliveredResult::Stored { url })
    }
}
