//! Content-addressed run report cache.

use sha2::{Digest, Sha256};
use tracing::debug;

use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::report::RunReport;

use crate::store::ObjectStore;

/// Digest of the two raw input payloads: SHA-256 over the exact bytes,
/// users dataset first, then the mapping dataset. Hashing the raw bytes
/// (never parsed structures) means even a whitespace-only edit correctly
/// invalidates the cache.
pub fn compute_digest(users_bytes: &[u8], mapping_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(users_bytes);
    hasher.update(mapping_bytes);
    hex::encode(hasher.finalize())
}

/// Stores one JSON report per input digest under `{prefix}{digest}.json`.
pub struct ResultCache<S: ObjectStore> {
    store: S,
    prefix: String,
}

impl<S: ObjectStore> ResultCache<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, digest: &str) -> String {
        format!("{}{digest}.json", self.prefix)
    }

    /// The previously stored report for this digest, if any. Absence is not
    /// an error.
    pub async fn lookup(&self, digest: &str) -> Result<Option<RunReport>> {
        let key = self.key(digest);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let report = serde_json::from_slice(&bytes).map_err(|e| {
            DirsyncError::Serialization(format!("stored report {key} is unreadable: {e}"))
        })?;
        debug!(digest, "cache hit");
        Ok(Some(report))
    }

    /// Persist the report under its digest. Overwriting is safe: content
    /// under a given digest is semantically identical.
    pub async fn store(&self, digest: &str, report: &RunReport) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(report).map_err(|e| {
            DirsyncError::Serialization(format!("cannot serialize report: {e}"))
        })?;
        self.store.put(&self.key(digest), &bytes).await
    }
}
