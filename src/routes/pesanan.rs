use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::MaybeSession;
use crate::models::pelanggan::Pelanggan;
use crate::models::role::Role;
use crate::models::status::{self, Audience, TransaksiStatus};
use crate::models::transaksi::TransaksiDetail;
use crate::routes::{bad_request, internal_error, not_found, ApiError};
use crate::AppState;

fn order_json(detail: &TransaksiDetail, audience: Audience) -> Value {
    let raw = &detail.transaksi.status_transaksi;
    let can_cancel = raw
        .parse::<TransaksiStatus>()
        .map(|s| s.is_cancelable())
        .unwrap_or(false);
    json!({
        "transaksi": detail,
        "status_label": status::label_for_raw(raw, audience),
        "badge_class": status::badge_class_for_raw(raw),
        "can_cancel": can_cancel,
    })
}

async fn own_profile(
    state: &AppState,
    token: Option<String>,
    email: &str,
) -> Result<Option<Pelanggan>, ApiError> {
    state
        .backend
        .table("pelanggan")
        .maybe_auth(token)
        .select("*")
        .eq("email", email)
        .fetch_optional()
        .await
        .map_err(internal_error)
}

/// A customer's own order history, with customer-facing labels.
pub async fn list_own(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    let ctx = session.protect(&[Role::Pelanggan]).await?;
    let snap = ctx.store.snapshot().await;
    let email = snap
        .user
        .as_ref()
        .map(|u| u.email.clone())
        .unwrap_or_default();
    let token = ctx.access_token().await;

    let profile = own_profile(&state, token.clone(), &email)
        .await
        .map_err(IntoResponse::into_response)?;
    let profile = match profile {
        Some(profile) => profile,
        // No profile yet means no orders yet.
        None => return Ok(Json(json!({ "pesanan": [] }))),
    };

    let orders: Vec<TransaksiDetail> = state
        .backend
        .table("transaksi")
        .maybe_auth(token)
        .select("*, mobil(*), pelanggan(*)")
        .eq("id_pelanggan", profile.id_pelanggan)
        .order("id_transaksi", false)
        .fetch_all()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    let pesanan: Vec<Value> = orders
        .iter()
        .map(|d| order_json(d, Audience::Customer))
        .collect();
    Ok(Json(json!({ "pesanan": pesanan })))
}

/// Badge count for the storefront navbar: how many of the caller's
/// own bookings are waiting to start. Polled alongside the order list.
pub async fn pending_count(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    let ctx = session.protect(&[Role::Pelanggan]).await?;
    let snap = ctx.store.snapshot().await;
    let email = snap
        .user
        .as_ref()
        .map(|u| u.email.clone())
        .unwrap_or_default();
    let token = ctx.access_token().await;

    let profile = own_profile(&state, token.clone(), &email)
        .await
        .map_err(IntoResponse::into_response)?;
    let profile = match profile {
        Some(profile) => profile,
        // No profile yet means nothing pending.
        None => return Ok(Json(json!({ "count": 0 }))),
    };

    let count = state
        .backend
        .table("transaksi")
        .maybe_auth(token)
        .eq("id_pelanggan", profile.id_pelanggan)
        .eq("status_transaksi", TransaksiStatus::Konfirmasi)
        .count()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    Ok(Json(json!({ "count": count })))
}

/// Cancel one of the caller's own waiting orders.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id_transaksi): Path<i64>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    let ctx = session.protect(&[Role::Pelanggan]).await?;
    let snap = ctx.store.snapshot().await;
    let email = snap
        .user
        .as_ref()
        .map(|u| u.email.clone())
        .unwrap_or_default();
    let token = ctx.access_token().await;

    let profile = own_profile(&state, token.clone(), &email)
        .await
        .map_err(IntoResponse::into_response)?
        .ok_or_else(|| not_found("Pemesanan tidak ditemukan").into_response())?;

    let order: Option<TransaksiDetail> = state
        .backend
        .table("transaksi")
        .maybe_auth(token.clone())
        .select("*")
        .eq("id_transaksi", id_transaksi)
        .eq("id_pelanggan", profile.id_pelanggan)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    let order = order.ok_or_else(|| not_found("Pemesanan tidak ditemukan").into_response())?;

    let cancelable = order
        .transaksi
        .status_transaksi
        .parse::<TransaksiStatus>()
        .map(|s| s.is_cancelable())
        .unwrap_or(false);
    if !cancelable {
        return Err(bad_request("Pemesanan tidak dapat dibatalkan.").into_response());
    }

    state
        .backend
        .table("transaksi")
        .maybe_auth(token)
        .eq("id_transaksi", id_transaksi)
        .update(json!({ "status_transaksi": TransaksiStatus::Batal }))
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({ "message": "Pemesanan berhasil dibatalkan." })))
}

/// Staff view across all orders, with back-office labels.
pub async fn list_for_staff(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    let _ctx = session.protect(&[Role::Admin, Role::Petugas]).await?;

    let orders: Vec<TransaksiDetail> = state
        .backend
        .table("transaksi")
        .select("*, mobil(*), pelanggan(*)")
        .order("id_transaksi", false)
        .fetch_all()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    let pesanan: Vec<Value> = orders
        .iter()
        .map(|d| order_json(d, Audience::Admin))
        .collect();
    Ok(Json(json!({ "pesanan": pesanan })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use tokio::sync::watch;

    use crate::backend::testing::{MockAuth, MockDirectory};
    use crate::backend::{AuthApi, Backend, RoleDirectory};
    use crate::config::Config;
    use crate::session::{SessionContext, SessionRegistry, SessionStore};

    fn test_state() -> AppState {
        let config = Config {
            backend_url: "http://localhost:9".into(),
            anon_key: "anon".into(),
            project_ref: "testref".into(),
            host: "127.0.0.1".into(),
            port: 0,
            assets_bucket: "assets".into(),
            app_base_url: "http://localhost:5173".into(),
        };
        let backend = Backend::new(&config).expect("backend client");
        AppState {
            backend,
            config: Arc::new(config),
            sessions: SessionRegistry::new(),
            pending: watch::channel(0).1,
        }
    }

    async fn signed_out_context() -> Arc<SessionContext> {
        let auth: Arc<dyn AuthApi> = Arc::new(MockAuth::new());
        let directory: Arc<dyn RoleDirectory> = Arc::new(MockDirectory::new());
        let store = Arc::new(SessionStore::new(
            auth.clone(),
            directory.clone(),
            "testref",
        ));
        store.initialize().await;
        let subscription = Arc::clone(&store).subscribe_to_changes();
        Arc::new(SessionContext::new(auth, directory, store, subscription))
    }

    #[tokio::test]
    async fn pending_count_without_a_context_is_unauthorized() {
        let response = pending_count(State(test_state()), MaybeSession(None))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn pending_count_with_a_signed_out_store_is_unauthorized() {
        let ctx = signed_out_context().await;
        let response = pending_count(State(test_state()), MaybeSession(Some(ctx)))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
