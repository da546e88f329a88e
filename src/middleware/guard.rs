use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::backend::{AuthApi, RoleDirectory};
use crate::models::role::{resolve_role, role_home, Role};
use crate::session::{SessionContext, SessionStore};

/// Upper bound on waiting for a store that never leaves `loading`.
/// Past it the guard treats the visitor as signed out rather than
/// hanging forever.
pub const LOADING_CAP: Duration = Duration::from_secs(5);

/// Name of the cookie tying a request to its browser context.
pub const CONTEXT_COOKIE: &str = "sm_ctx";

/// What the guard decided for one protected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Authenticated and allowed; let the handler run.
    Render,
    /// Not signed in. `return_to` keeps the attempted path so login
    /// can bounce back.
    RedirectLogin { return_to: Option<String> },
    /// Signed in but the role is not on the allow list; send them to
    /// their own landing page.
    RedirectHome(Role),
}

impl GuardDecision {
    pub fn into_response(self) -> Option<Response> {
        match self {
            GuardDecision::Render => None,
            GuardDecision::RedirectLogin { return_to } => {
                let target = match return_to {
                    Some(path) => format!("/login?redirect={}", encode_component(&path)),
                    None => "/login".to_string(),
                };
                Some(Redirect::to(&target).into_response())
            }
            GuardDecision::RedirectHome(role) => {
                Some(Redirect::to(role_home(role)).into_response())
            }
        }
    }
}

/// Roles allowed on a storefront path, or `None` for public pages.
/// Mirrors the client-side route table so navigation can be vetted
/// before the page loads.
pub fn allowed_roles_for(path: &str) -> Option<&'static [Role]> {
    let path = path.split('?').next().unwrap_or(path);
    let path = path.trim_end_matches('/');
    if path.starts_with("/sewa/") {
        return Some(&[Role::Pelanggan, Role::Petugas]);
    }
    match path {
        "/edit-profil" | "/pesanan" => Some(&[Role::Pelanggan]),
        "/pesanan-petugas" | "/dashboard/petugas" => Some(&[Role::Petugas]),
        "/dashboard/mobil" => Some(&[Role::Admin, Role::Petugas]),
        "/dashboard" | "/dashboard/pelanggan-data" | "/dashboard/user" | "/dashboard/laporan" => {
            Some(&[Role::Admin])
        }
        _ => None,
    }
}

/// Early check against the external session, run before any store has
/// settled. A role-lookup failure here is treated as signed out.
pub async fn pre_navigation(
    auth: &dyn AuthApi,
    directory: &dyn RoleDirectory,
    allowed: &[Role],
    path: &str,
) -> GuardDecision {
    let session = match auth.get_session().await {
        Some(session) => session,
        None => {
            return GuardDecision::RedirectLogin {
                return_to: Some(path.to_string()),
            }
        }
    };
    let row = match directory.find_role(&session.user.email).await {
        Ok(row) => row,
        Err(e) => {
            warn!(email = %session.user.email, error = %e, "guard role lookup failed");
            return GuardDecision::RedirectLogin { return_to: None };
        }
    };
    let role = resolve_role(row.as_ref(), session.user.role_claim());
    // An empty allow list admits any authenticated role.
    if allowed.is_empty() || allowed.contains(&role) {
        GuardDecision::Render
    } else {
        GuardDecision::RedirectHome(role)
    }
}

/// Check against the settled store state, waiting out `loading` up to
/// the cap first.
pub async fn render_guard(store: &SessionStore, allowed: &[Role]) -> GuardDecision {
    if tokio::time::timeout(LOADING_CAP, store.wait_until_ready())
        .await
        .is_err()
    {
        warn!("session store still loading after cap, treating as signed out");
    }
    let state = store.snapshot().await;
    if !state.authenticated {
        return GuardDecision::RedirectLogin { return_to: None };
    }
    let role = state.role.unwrap_or(Role::Pelanggan);
    if allowed.is_empty() || allowed.contains(&role) {
        GuardDecision::Render
    } else {
        GuardDecision::RedirectHome(role)
    }
}

/// The request's browser context, when its cookie maps to a live one.
pub struct MaybeSession(pub Option<Arc<SessionContext>>);

impl MaybeSession {
    /// Deny unless a context exists and its store passes the guard.
    /// API callers get 401 JSON rather than a redirect.
    pub async fn protect(&self, allowed: &[Role]) -> Result<Arc<SessionContext>, Response> {
        let ctx = match &self.0 {
            Some(ctx) => Arc::clone(ctx),
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Silakan login terlebih dahulu." })),
                )
                    .into_response())
            }
        };
        match render_guard(&ctx.store, allowed).await {
            GuardDecision::Render => Ok(ctx),
            GuardDecision::RedirectLogin { .. } => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Silakan login terlebih dahulu." })),
            )
                .into_response()),
            GuardDecision::RedirectHome(role) => Err((
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Anda tidak memiliki akses ke halaman ini.",
                    "redirect": role_home(role),
                })),
            )
                .into_response()),
        }
    }
}

impl FromRequestParts<crate::AppState> for MaybeSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(cookie_value);
        let ctx = match token {
            Some(token) => state.sessions.get(&token).await,
            None => None,
        };
        Ok(MaybeSession(ctx))
    }
}

fn cookie_value(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == CONTEXT_COOKIE).then(|| value.to_string())
    })
}

/// Percent-encode a path for use inside a query string.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
