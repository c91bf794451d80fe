//! HTTP surface for the sync engine.
//!
//! Exposes a health probe, a sync trigger that accepts either multipart CSV
//! uploads or the previously stored datasets, and a mapping reload endpoint.
//! All responses are JSON; authentication is a shared API key header.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Query, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use dirsync_core::config::DirsyncConfig;
use dirsync_core::csv::read_mappings;
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::report::{RunReport, RunStatus};
use dirsync_engine::cache::ResultCache;
use dirsync_engine::client::HttpDirectoryClient;
use dirsync_engine::resolver::{resolve, MappingCache};
use dirsync_engine::service::SyncService;
use dirsync_engine::store::{FsObjectStore, ObjectStore};

pub mod auth;

/// Shared application state for all routes.
pub struct AppState {
    pub service: SyncService<HttpDirectoryClient, Arc<FsObjectStore>>,
    pub store: Arc<FsObjectStore>,
    pub mappings: MappingCache,
    pub config: DirsyncConfig,
}

impl AppState {
    pub fn from_config(config: DirsyncConfig) -> Self {
        let client = HttpDirectoryClient::new(&config.remote);
        let store = Arc::new(FsObjectStore::new(&config.storage.root));
        let cache = ResultCache::new(store.clone(), &config.storage.results_prefix);
        let service = SyncService::new(
            client,
            cache,
            config.sync.clone(),
            config.remote.organization_id,
        );
        Self {
            service,
            store,
            mappings: MappingCache::new(),
            config,
        }
    }
}

/// Build the API router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(trigger_sync))
        .route("/mappings/reload", post(reload_mappings))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.server.bind, state.config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state))
        .await
        .map_err(DirsyncError::Io)?;
    Ok(())
}

// -- Health --

async fn health() -> &'static str {
    "ok"
}

// -- Sync --

#[derive(Debug, Default, Deserialize)]
struct SyncQuery {
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    force: bool,
}

async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncQuery>,
    req: Request<Body>,
) -> Response {
    let (users_bytes, mapping_bytes) = match request_inputs(&state, req, !query.dry_run).await {
        Ok(inputs) => inputs,
        Err(e) => return error_response(e),
    };

    match state
        .service
        .execute_sync(&users_bytes, &mapping_bytes, query.dry_run, query.force)
        .await
    {
        Ok(report) => report_response(report),
        Err(e) => error_response(e),
    }
}

/// Gather the two CSV datasets for a run: multipart uploads when present,
/// otherwise the stored copies. With `persist` set, an uploaded part replaces
/// the stored copy so later storage-backed runs see it; dry runs pass false
/// and their uploads are used for that run only.
async fn request_inputs(
    state: &AppState,
    req: Request<Body>,
    persist: bool,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut users: Option<Vec<u8>> = None;
    let mut mapping: Option<Vec<u8>> = None;

    if is_multipart(&req) {
        let mut parts = Multipart::from_request(req, &())
            .await
            .map_err(|e| DirsyncError::Input(format!("invalid multipart payload: {e}")))?;
        while let Some(field) = parts
            .next_field()
            .await
            .map_err(|e| DirsyncError::Input(format!("invalid multipart payload: {e}")))?
        {
            let name = field.name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| DirsyncError::Input(format!("unreadable upload: {e}")))?
                .to_vec();
            match name.as_deref() {
                Some("users_file") => users = Some(bytes),
                Some("mapping_file") => mapping = Some(bytes),
                _ => {}
            }
        }
    }

    if persist {
        if let Some(bytes) = &users {
            state
                .store
                .put(&state.config.storage.users_key, bytes)
                .await?;
        }
        if let Some(bytes) = &mapping {
            load_mapping_cache(state, bytes.clone()).await?;
        }
    }

    let users_bytes = match users {
        Some(bytes) => bytes,
        None => state
            .store
            .get(&state.config.storage.users_key)
            .await?
            .ok_or_else(|| {
                DirsyncError::Input("no users file uploaded and none stored".to_string())
            })?,
    };

    let mapping_bytes = match mapping {
        Some(bytes) => bytes,
        None => match state.mappings.get() {
            Some(loaded) => loaded.bytes.as_ref().clone(),
            None => {
                let bytes = state
                    .store
                    .get(&state.config.storage.mapping_key)
                    .await?
                    .ok_or_else(|| {
                        DirsyncError::Input(
                            "no mapping file uploaded and none stored".to_string(),
                        )
                    })?;
                load_mapping_cache(state, bytes.clone()).await?;
                bytes
            }
        },
    };

    Ok((users_bytes, mapping_bytes))
}

/// Validate mapping bytes, persist them, and swap them into the cache.
async fn load_mapping_cache(state: &AppState, bytes: Vec<u8>) -> Result<usize> {
    let rows = read_mappings(&bytes, &state.config.sync.mapping_columns)?;
    let mut logs = Vec::new();
    let index = resolve(&rows, state.config.remote.organization_id, &mut logs);
    let groups = index.len();
    state
        .store
        .put(&state.config.storage.mapping_key, &bytes)
        .await?;
    state.mappings.reload(bytes, index);
    Ok(groups)
}

fn is_multipart(req: &Request<Body>) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

fn report_response(report: RunReport) -> Response {
    let code = match report.status {
        RunStatus::Success | RunStatus::Cached => StatusCode::OK,
        RunStatus::Error => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (code, Json(report)).into_response()
}

fn error_response(e: DirsyncError) -> Response {
    let code = match &e {
        DirsyncError::Input(_) => StatusCode::BAD_REQUEST,
        DirsyncError::Remote(_) | DirsyncError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({"error": e.to_string()}))).into_response()
}

// -- Mappings --

async fn reload_mappings(State(state): State<Arc<AppState>>) -> Response {
    let bytes = match state.store.get(&state.config.storage.mapping_key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            return error_response(DirsyncError::Input(format!(
                "no mapping dataset stored under '{}'",
                state.config.storage.mapping_key
            )))
        }
        Err(e) => return error_response(e),
    };

    match load_mapping_cache(&state, bytes).await {
        Ok(groups) => (StatusCode::OK, Json(json!({ "groups": groups }))).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::CONTENT_TYPE;

    use dirsync_core::config::{RemoteConfig, ServerConfig, StorageConfig, SyncOptions};

    use super::*;

    fn state_with_root(root: &std::path::Path) -> AppState {
        AppState::from_config(DirsyncConfig {
            remote: RemoteConfig {
                auth_url: "http://127.0.0.1:1".to_string(),
                users_url: "http://127.0.0.1:1".to_string(),
                api_key: "remote-key".to_string(),
                organization_id: 7,
            },
            server: ServerConfig::default(),
            storage: StorageConfig {
                root: root.display().to_string(),
                ..StorageConfig::default()
            },
            sync: SyncOptions::default(),
        })
    }

    #[tokio::test]
    async fn storage_fallback_loads_stored_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_root(dir.path());
        state
            .store
            .put("ad_users.csv", b"name,email,group\nJane,j@x.com,eng\n")
            .await
            .unwrap();
        state
            .store
            .put("group_mapping.csv", b"group,scope,roles\neng,ns1,admin\n")
            .await
            .unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/sync")
            .body(Body::empty())
            .unwrap();
        let (users, mapping) = request_inputs(&state, req, true).await.unwrap();

        assert!(users.starts_with(b"name,email,group"));
        assert!(mapping.starts_with(b"group,scope,roles"));
        // The fallback load primes the mapping cache for later runs.
        let loaded = state.mappings.get().unwrap();
        assert!(loaded.index.contains_key("eng"));
    }

    #[tokio::test]
    async fn missing_stored_users_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_root(dir.path());

        let req = Request::builder()
            .method("POST")
            .uri("/sync")
            .body(Body::empty())
            .unwrap();
        let err = request_inputs(&state, req, true).await.unwrap_err();
        assert!(matches!(err, DirsyncError::Input(_)));
    }

    fn upload_request(users: &str, mapping: &str) -> Request<Body> {
        let boundary = "----dirsync-test";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"users_file\"; filename=\"users.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {users}\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"mapping_file\"; filename=\"mapping.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {mapping}\r\n\
             --{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/sync")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn uploads_replace_stored_datasets_and_prime_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_root(dir.path());

        let req = upload_request(
            "name,email,group\nJane,j@x.com,eng",
            "group,scope,roles\neng,ns1,admin",
        );
        let (users, mapping) = request_inputs(&state, req, true).await.unwrap();

        assert!(users.starts_with(b"name,email,group"));
        assert!(mapping.starts_with(b"group,scope,roles"));
        let stored = state.store.get("ad_users.csv").await.unwrap().unwrap();
        assert_eq!(stored, users);
        let stored = state.store.get("group_mapping.csv").await.unwrap().unwrap();
        assert_eq!(stored, mapping);
        assert!(state.mappings.get().unwrap().index.contains_key("eng"));
    }

    #[tokio::test]
    async fn dry_run_uploads_leave_stored_datasets_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_root(dir.path());
        state
            .store
            .put("ad_users.csv", b"name,email,group\nJane,j@x.com,eng\n")
            .await
            .unwrap();
        state
            .store
            .put("group_mapping.csv", b"group,scope,roles\neng,ns1,admin\n")
            .await
            .unwrap();

        let req = upload_request(
            "name,email,group\nNew,n@x.com,ops",
            "group,scope,roles\nops,ns2,editor",
        );
        let (users, mapping) = request_inputs(&state, req, false).await.unwrap();

        // The candidate datasets feed the run itself.
        assert!(users.starts_with(b"name,email,group\nNew"));
        assert!(mapping.starts_with(b"group,scope,roles\nops"));
        // The stored copies and the mapping cache stay canonical.
        let stored = state.store.get("ad_users.csv").await.unwrap().unwrap();
        assert!(stored.starts_with(b"name,email,group\nJane"));
        let stored = state.store.get("group_mapping.csv").await.unwrap().unwrap();
        assert!(stored.starts_with(b"group,scope,roles\neng"));
        assert!(state.mappings.get().is_none());
    }

    #[test]
    fn multipart_detection_reads_content_type() {
        let req = Request::builder()
            .header(
                CONTENT_TYPE,
                "multipart/form-data; boundary=----x",
            )
            .body(Body::empty())
            .unwrap();
        assert!(is_multipart(&req));

        let req = Request::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(Body::empty())
            .unwrap();
        assert!(!is_multipart(&req));

        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(!is_multipart(&req));
    }

    #[test]
    fn sync_query_defaults_off() {
        let query: SyncQuery = serde_urlencoded::from_str("").unwrap();
        assert!(!query.dry_run);
        assert!(!query.force);

        let query: SyncQuery = serde_urlencoded::from_str("dry_run=true&force=true").unwrap();
        assert!(query.dry_run);
        assert!(query.force);
    }

    #[test]
    fn blocked_report_maps_to_422() {
        let report = RunReport::error("digest".to_string(), vec![]);
        let response = report_response(report);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn input_errors_map_to_400() {
        let response = error_response(DirsyncError::Input("bad csv".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = error_response(DirsyncError::Remote("upstream 500".into()));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
