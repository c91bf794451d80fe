//! The persisted, content-addressed run report.

use serde::{Deserialize, Serialize};

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Cached,
    Error,
}

/// Structured result of one sync run. The JSON shape is an external
/// contract: it is both the HTTP response body and the object persisted
/// under `results/{digest}.json`.
///
/// `logs` is the deterministic, timestamp-free audit trail; a report served
/// from cache carries counts and logs byte-identical to the originally
/// stored success report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub users_processed: u64,
    pub users_created: u64,
    pub users_updated: u64,
    pub users_deleted: u64,
    pub users_skipped: u64,
    pub logs: Vec<String>,
    pub input_digest: String,
}

impl RunReport {
    /// A report for a run that never got past validation or input parsing.
    pub fn error(digest: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            status: RunStatus::Error,
            users_processed: 0,
            users_created: 0,
            users_updated: 0,
            users_deleted: 0,
            users_skipped: 0,
            logs,
            input_digest: digest.into(),
        }
    }

    /// The same report re-served from cache: identical counts and logs,
    /// status flipped to `cached`.
    pub fn as_cached(mut self) -> Self {
        self.status = RunStatus::Cached;
        self
    }
}
