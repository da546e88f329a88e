use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::{AuthApi, RoleDirectory};
use crate::middleware::guard::CONTEXT_COOKIE;
use crate::middleware::{
    allowed_roles_for, pre_navigation, GuardDecision, MaybeSession, LOADING_CAP,
};
use crate::models::role::{role_home, Role};
use crate::models::user::{LoginRequest, RegisterRequest};
use crate::routes::ApiError;
use crate::session::{
    new_context_token, AuthOutcome, SessionContext, SessionStore, SignOutRecovery,
};
use crate::AppState;

/// Build a JSON response, optionally (re)setting the context cookie.
/// `Some("")` clears it.
fn json_response_with_cookie(body: &Value, context_token: Option<&str>) -> Response {
    let body_str = serde_json::to_string(body).unwrap_or_default();
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = context_token {
        let cookie = if token.is_empty() {
            format!("{CONTEXT_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
        } else {
            format!("{CONTEXT_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age=604800")
        };
        builder = builder.header(header::SET_COOKIE, cookie);
    }
    builder.body(Body::from(body_str)).unwrap_or_default()
}

/// Mint a fresh browser context: its own auth client, store and
/// change subscription.
async fn open_context(state: &AppState) -> (String, Arc<SessionContext>) {
    let auth: Arc<dyn AuthApi> = Arc::new(state.backend.auth_client());
    let directory: Arc<dyn RoleDirectory> = Arc::new(state.backend.clone());
    let store = Arc::new(SessionStore::new(
        auth.clone(),
        directory.clone(),
        state.config.project_ref.clone(),
    ));
    store.initialize().await;
    let subscription = Arc::clone(&store).subscribe_to_changes();
    let ctx = Arc::new(SessionContext::new(auth, directory, store, subscription));
    let token = new_context_token();
    state.sessions.insert(token.clone(), Arc::clone(&ctx)).await;
    (token, ctx)
}

fn session_body(user_email: &str, role: Role, display_name: Option<&str>) -> Value {
    json!({
        "user": { "email": user_email },
        "role": role,
        "display_name": display_name,
        "redirect": role_home(role),
    })
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let (token, ctx) = open_context(&state).await;
    match ctx.store.sign_in(&body.email, &body.password).await {
        AuthOutcome::Success { user } => {
            let snap = ctx.store.snapshot().await;
            let role = snap.role.unwrap_or(Role::Pelanggan);
            Ok(json_response_with_cookie(
                &session_body(&user.email, role, snap.display_name.as_deref()),
                Some(&token),
            ))
        }
        AuthOutcome::Failure { error } => {
            state.sessions.remove(&token).await;
            ctx.teardown().await;
            Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": error }))))
        }
    }
}

/// Self-service storefront registration; always a customer account.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let (token, ctx) = open_context(&state).await;
    match ctx
        .store
        .sign_up(&body.email, &body.password, Role::Pelanggan)
        .await
    {
        AuthOutcome::Success { user } => {
            let snap = ctx.store.snapshot().await;
            let role = snap.role.unwrap_or(Role::Pelanggan);
            Ok(json_response_with_cookie(
                &session_body(&user.email, role, snap.display_name.as_deref()),
                Some(&token),
            ))
        }
        AuthOutcome::Failure { error } => {
            state.sessions.remove(&token).await;
            ctx.teardown().await;
            Err((StatusCode::BAD_REQUEST, Json(json!({ "error": error }))))
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Response, ApiError> {
    let ctx = match session.0 {
        Some(ctx) => ctx,
        // Nothing to sign out of; still clear the cookie.
        None => return Ok(json_response_with_cookie(&json!({ "ok": true }), Some(""))),
    };
    let recovery = ctx.store.sign_out().await;

    // The context is gone either way.
    drop_context(&state, &ctx).await;

    let body = match recovery {
        SignOutRecovery::Clean => json!({ "ok": true }),
        SignOutRecovery::ForceReload { location } => {
            json!({ "ok": true, "reload": true, "location": location })
        }
    };
    Ok(json_response_with_cookie(&body, Some("")))
}

async fn drop_context(state: &AppState, ctx: &Arc<SessionContext>) {
    // Registry is keyed by token; find it by identity since the
    // extractor does not carry the raw cookie value along.
    let token = state.sessions.find_token(ctx).await;
    if let Some(token) = token {
        state.sessions.remove(&token).await;
    }
    ctx.teardown().await;
}

#[derive(Deserialize)]
pub struct GuardQuery {
    path: String,
}

/// Vet a navigation before the client commits to it. Public paths
/// pass unconditionally; protected ones go through the early guard.
pub async fn guard_check(session: MaybeSession, Query(query): Query<GuardQuery>) -> Response {
    let allowed = match allowed_roles_for(&query.path) {
        Some(allowed) => allowed,
        None => return Json(json!({ "allow": true })).into_response(),
    };
    let decision = match &session.0 {
        Some(ctx) => {
            pre_navigation(ctx.auth.as_ref(), ctx.directory.as_ref(), allowed, &query.path).await
        }
        None => GuardDecision::RedirectLogin {
            return_to: Some(query.path.clone()),
        },
    };
    match decision.into_response() {
        None => Json(json!({ "allow": true })).into_response(),
        Some(redirect) => redirect,
    }
}

pub async fn me(session: MaybeSession) -> Result<Json<Value>, ApiError> {
    let ctx = match session.0 {
        Some(ctx) => ctx,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Silakan login terlebih dahulu." })),
            ))
        }
    };
    // Same cap as the render guard; a store stuck in `loading` must
    // not hang the request.
    if tokio::time::timeout(LOADING_CAP, ctx.store.wait_until_ready())
        .await
        .is_err()
    {
        tracing::warn!("session store still loading after cap, answering from the snapshot");
    }
    let snap = ctx.store.snapshot().await;
    if !snap.authenticated {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Session sudah berakhir." })),
        ));
    }
    let role = snap.role.unwrap_or(Role::Pelanggan);
    Ok(Json(json!({
        "user": snap.user.map(|u| json!({ "id": u.id, "email": u.email })),
        "role": role,
        "display_name": snap.display_name,
        "redirect": role_home(role),
    })))
}
