//! Typed reqwest wrapper for the remote identity/authorization service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use dirsync_core::config::RemoteConfig;
use dirsync_core::error::{DirsyncError, Result};
use dirsync_core::models::user::RemoteGrant;

/// Page size for user listing.
const LIST_PAGE_SIZE: usize = 100;
/// Refresh the bearer token this many milliseconds before it expires.
const TOKEN_EXPIRY_LEEWAY_MS: i64 = 60_000;

/// Remote user lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

/// A user as the remote service returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub id: i64,
    pub email: String,
    pub status: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl ApiUser {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    results: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct GrantResponse {
    #[serde(default)]
    grants: Vec<ApiGrant>,
}

#[derive(Debug, Deserialize)]
struct ApiGrant {
    id: i64,
    nrn: String,
    role: ApiRole,
}

#[derive(Debug, Deserialize)]
struct ApiRole {
    slug: String,
}

/// Seam between the engine and the remote service. The executor and tests
/// depend on this trait, not on HTTP.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// All users of the organization, across pages, in listing order.
    async fn list_all_users(&self) -> Result<Vec<ApiUser>>;
    /// Current grants of one user, flattened to (grant id, scope, role).
    async fn user_grants(&self, user_id: i64) -> Result<Vec<RemoteGrant>>;
    async fn create_user(&self, email: &str, first_name: &str, last_name: &str)
        -> Result<ApiUser>;
    async fn set_user_status(&self, user_id: i64, status: UserStatus) -> Result<()>;
    async fn delete_user(&self, user_id: i64) -> Result<()>;
    async fn create_grant(&self, user_id: i64, role: &str, scope: &str) -> Result<()>;
    async fn delete_grant(&self, grant_id: i64) -> Result<()>;
}

struct CachedToken {
    access_token: String,
    expires_at_ms: i64,
}

/// HTTP client for the remote identity service. Exchanges the configured API
/// key for a bearer token and refreshes it shortly before expiry.
pub struct HttpDirectoryClient {
    http: reqwest::Client,
    auth_url: String,
    users_url: String,
    api_key: String,
    organization_id: i64,
    token: Mutex<Option<CachedToken>>,
}

impl HttpDirectoryClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            users_url: config.users_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            organization_id: config.organization_id,
            token: Mutex::new(None),
        }
    }

    /// Point both endpoints at one base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.auth_url = url.trim_end_matches('/').to_string();
        self.users_url = self.auth_url.clone();
        self
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Some(cached) = guard.as_ref() {
            if now_ms < cached.expires_at_ms - TOKEN_EXPIRY_LEEWAY_MS {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = self
            .http
            .post(format!("{}/token", self.auth_url))
            .json(&serde_json::json!({ "api_key": self.api_key }))
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("token request failed: {e}")))?;
        let token: TokenResponse = check_response(resp, "token exchange").await?;

        debug!(expires_at = token.token_expires_at, "refreshed bearer token");
        let access = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at_ms: token.token_expires_at,
        });
        Ok(access)
    }
}

/// Map a non-success response to a `Remote` error carrying status and body,
/// otherwise deserialize the JSON body.
async fn check_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
    context: &str,
) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DirsyncError::Remote(format!(
            "{context} failed ({status}): {body}"
        )));
    }
    resp.json::<T>()
        .await
        .map_err(|e| DirsyncError::Remote(format!("{context} parse failed: {e}")))
}

async fn check_status(resp: reqwest::Response, context: &str) -> Result<()> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DirsyncError::Remote(format!(
            "{context} failed ({status}): {body}"
        )));
    }
    Ok(())
}

#[async_trait]
impl DirectoryApi for HttpDirectoryClient {
    async fn list_all_users(&self) -> Result<Vec<ApiUser>> {
        let token = self.bearer_token().await?;
        let mut all = Vec::new();
        let mut offset = 0usize;

        loop {
            let resp = self
                .http
                .get(format!("{}/user/", self.users_url))
                .bearer_auth(&token)
                .query(&[
                    ("type", "person".to_string()),
                    ("limit", LIST_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                    ("organization_id", self.organization_id.to_string()),
                ])
                .send()
                .await
                .map_err(|e| DirsyncError::Remote(format!("list users request failed: {e}")))?;

            let page: UserListResponse = check_response(resp, "list users").await?;
            let count = page.results.len();
            all.extend(page.results);

            if count < LIST_PAGE_SIZE {
                break;
            }
            offset += LIST_PAGE_SIZE;
        }

        Ok(all)
    }

    async fn user_grants(&self, user_id: i64) -> Result<Vec<RemoteGrant>> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .get(format!("{}/authz/user_role", self.auth_url))
            .bearer_auth(&token)
            .query(&[
                ("user_id", user_id.to_string()),
                ("nrn", format!("organization={}", self.organization_id)),
            ])
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("get grants request failed: {e}")))?;

        let responses: Vec<GrantResponse> = check_response(resp, "get grants").await?;
        let grants = responses
            .into_iter()
            .flat_map(|r| r.grants)
            .map(|g| RemoteGrant {
                id: g.id,
                scope: g.nrn,
                role: g.role.slug,
            })
            .collect();
        Ok(grants)
    }

    async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<ApiUser> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .post(format!("{}/user/", self.users_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "email": email,
                "first_name": first_name,
                "last_name": last_name,
                "organization_id": self.organization_id,
            }))
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("create user request failed: {e}")))?;

        check_response(resp, "create user").await
    }

    async fn set_user_status(&self, user_id: i64, status: UserStatus) -> Result<()> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .patch(format!("{}/user/{user_id}", self.users_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "status": status.as_str() }))
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("set user status request failed: {e}")))?;

        check_status(resp, "set user status").await
    }

    async fn delete_user(&self, user_id: i64) -> Result<()> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .delete(format!("{}/user/{user_id}", self.users_url))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("delete user request failed: {e}")))?;

        check_status(resp, "delete user").await
    }

    async fn create_grant(&self, user_id: i64, role: &str, scope: &str) -> Result<()> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .post(format!("{}/authz/grants", self.auth_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "role_slug": role,
                "user_id": user_id,
                "nrn": scope,
            }))
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("create grant request failed: {e}")))?;

        check_status(resp, "create grant").await
    }

    async fn delete_grant(&self, grant_id: i64) -> Result<()> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .delete(format!("{}/authz/grants/{grant_id}", self.auth_url))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DirsyncError::Remote(format!("delete grant request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            // Already gone; revocation is idempotent.
            return Ok(());
        }
        check_status(resp, "delete grant").await
    }
}
