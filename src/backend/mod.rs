pub mod auth;
pub mod storage;
pub mod table;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::config::Config;
use crate::models::role::{Role, RoleRow};

pub use auth::{AuthApi, AuthChange, AuthEventKind, HttpAuthClient};
pub use table::QueryBuilder;

/// Everything the hosted backend can fail with. PostgREST and the auth
/// endpoints both answer JSON error bodies; `Api` carries them through.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api {
        code: Option<String>,
        message: String,
    },
}

impl BackendError {
    /// PostgREST surfaces the Postgres unique-violation SQLSTATE.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, BackendError::Api { code: Some(c), .. } if c == "23505")
    }
}

/// Pull `{code, message}` (PostgREST) or `{msg}` / `{error_description}`
/// (auth endpoints) out of an error response body.
pub(crate) async fn api_error(resp: reqwest::Response) -> BackendError {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    let code = body.get("code").map(|c| match c {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    let message = body
        .get("message")
        .or_else(|| body.get("msg"))
        .or_else(|| body.get("error_description"))
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"));
    BackendError::Api { code, message }
}

/// Handle to the hosted backend (row, object and auth endpoints).
/// Cheap to clone; per-context auth clients are minted from it.
#[derive(Clone)]
pub struct Backend {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) anon_key: String,
    pub(crate) assets_bucket: String,
}

impl Backend {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            assets_bucket: config.assets_bucket.clone(),
        })
    }

    /// A fresh auth client holding its own live session — one per
    /// signed-in browser context.
    pub fn auth_client(&self) -> HttpAuthClient {
        HttpAuthClient::new(self.clone())
    }

    /// Liveness of the hosted auth endpoint.
    pub async fn health(&self) -> Result<(), BackendError> {
        let resp = self
            .http
            .get(format!("{}/auth/v1/health", self.base_url))
            .header("apikey", &self.anon_key)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(api_error(resp).await)
        }
    }
}

/// The slice of the row API the session store and the staff saga need.
/// Narrow on purpose so both run against an in-memory double in tests.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn find_role(&self, email: &str) -> Result<Option<RoleRow>, BackendError>;
    async fn find_customer_name(&self, email: &str) -> Result<Option<String>, BackendError>;
    async fn insert_account(&self, email: &str, role: Role) -> Result<(), BackendError>;
}

#[derive(serde::Deserialize)]
struct NamaRow {
    nama: Option<String>,
}

#[async_trait]
impl RoleDirectory for Backend {
    async fn find_role(&self, email: &str) -> Result<Option<RoleRow>, BackendError> {
        self.table("user")
            .select("role, username")
            .eq("email", email)
            .fetch_optional()
            .await
    }

    async fn find_customer_name(&self, email: &str) -> Result<Option<String>, BackendError> {
        let row: Option<NamaRow> = self
            .table("pelanggan")
            .select("nama")
            .eq("email", email)
            .fetch_optional()
            .await?;
        Ok(row.and_then(|r| r.nama))
    }

    async fn insert_account(&self, email: &str, role: Role) -> Result<(), BackendError> {
        self.table("user")
            .insert_minimal(&json!([{
                "email": email,
                "role": role,
                "created_at": Utc::now().date_naive(),
            }]))
            .await
    }
}
