//! TOML-based configuration for dirsync.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DirsyncError, Result};

/// Top-level dirsync configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirsyncConfig {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncOptions,
}

/// Remote identity/authorization service endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_users_url")]
    pub users_url: String,
    pub api_key: String,
    /// Organization the wildcard scope marker expands into.
    pub organization_id: i64,
}

fn default_auth_url() -> String {
    "https://auth.nullplatform.io".into()
}

fn default_users_url() -> String {
    "https://users.nullplatform.io".into()
}

/// HTTP trigger surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret checked against the `X-API-Key` request header.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            api_key: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

/// Object-store layout: where inputs are fetched from and reports persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store.
    #[serde(default = "default_storage_root")]
    pub root: String,
    #[serde(default = "default_users_key")]
    pub users_key: String,
    #[serde(default = "default_mapping_key")]
    pub mapping_key: String,
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            users_key: default_users_key(),
            mapping_key: default_mapping_key(),
            results_prefix: default_results_prefix(),
        }
    }
}

fn default_storage_root() -> String {
    "/var/lib/dirsync".into()
}

fn default_users_key() -> String {
    "ad_users.csv".into()
}

fn default_mapping_key() -> String {
    "group_mapping.csv".into()
}

fn default_results_prefix() -> String {
    "results/".into()
}

/// Engine policies. Thresholds and severities the original deployments treat
/// as environment-dependent are explicit here with documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Halt when predicted deletions exceed this fraction of current remote
    /// users. Default 0.20.
    #[serde(default = "default_mass_deletion_threshold")]
    pub mass_deletion_threshold: f64,
    /// Escalate duplicate input rows from advisory (skip the extras) to
    /// blocking. Default false.
    #[serde(default)]
    pub halt_on_duplicates: bool,
    /// Delete departed remote users outright instead of deactivating them.
    /// Default false (soft delete).
    #[serde(default)]
    pub hard_delete: bool,
    #[serde(default)]
    pub users_columns: UsersColumns,
    #[serde(default)]
    pub mapping_columns: MappingColumns,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mass_deletion_threshold: default_mass_deletion_threshold(),
            halt_on_duplicates: false,
            hard_delete: false,
            users_columns: UsersColumns::default(),
            mapping_columns: MappingColumns::default(),
        }
    }
}

fn default_mass_deletion_threshold() -> f64 {
    0.20
}

/// Header names of the users dataset. Observed deployments localize these,
/// so they are configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersColumns {
    #[serde(default = "default_col_name")]
    pub name: String,
    #[serde(default = "default_col_email")]
    pub email: String,
    #[serde(default = "default_col_group")]
    pub group: String,
}

impl Default for UsersColumns {
    fn default() -> Self {
        Self {
            name: default_col_name(),
            email: default_col_email(),
            group: default_col_group(),
        }
    }
}

fn default_col_name() -> String {
    "name".into()
}

fn default_col_email() -> String {
    "email".into()
}

fn default_col_group() -> String {
    "group".into()
}

/// Header names of the mapping dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingColumns {
    #[serde(default = "default_col_group")]
    pub group: String,
    #[serde(default = "default_col_scope")]
    pub scope: String,
    #[serde(default = "default_col_roles")]
    pub roles: String,
}

impl Default for MappingColumns {
    fn default() -> Self {
        Self {
            group: default_col_group(),
            scope: default_col_scope(),
            roles: default_col_roles(),
        }
    }
}

fn default_col_scope() -> String {
    "scope".into()
}

fn default_col_roles() -> String {
    "roles".into()
}

impl DirsyncConfig {
    /// Load and parse the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DirsyncError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: DirsyncConfig = toml::from_str(&contents)
            .map_err(|e| DirsyncError::Config(format!("invalid TOML: {e}")))?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.remote.api_key.is_empty() {
            return Err(DirsyncError::Config("remote.api_key is empty".into()));
        }
        if self.remote.organization_id <= 0 {
            return Err(DirsyncError::Config(
                "remote.organization_id must be positive".into(),
            ));
        }
        let threshold = self.sync.mass_deletion_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DirsyncError::Config(format!(
                "sync.mass_deletion_threshold must be within [0.0, 1.0], got {threshold}"
            )));
        }
        Ok(())
    }
}
