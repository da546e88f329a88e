use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use crate::middleware::MaybeSession;
use crate::models::pelanggan::Pelanggan;
use crate::models::role::Role;
use crate::routes::{internal_error, not_found};
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Vec<Pelanggan>>, Response> {
    session.protect(&[Role::Admin]).await?;
    let pelanggan: Vec<Pelanggan> = state
        .backend
        .table("pelanggan")
        .select("*")
        .order("id_pelanggan", true)
        .fetch_all()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    Ok(Json(pelanggan))
}

/// Removing a customer also drops their `user` row so the account can
/// no longer sign in. The second delete is best effort.
pub async fn delete(
    State(state): State<AppState>,
    Path(id_pelanggan): Path<i64>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin]).await?;

    let existing: Option<Pelanggan> = state
        .backend
        .table("pelanggan")
        .select("*")
        .eq("id_pelanggan", id_pelanggan)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    let existing =
        existing.ok_or_else(|| not_found("Pelanggan tidak ditemukan").into_response())?;

    state
        .backend
        .table("pelanggan")
        .eq("id_pelanggan", id_pelanggan)
        .delete()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    if !existing.email.is_empty() {
        if let Err(e) = state
            .backend
            .table("user")
            .eq("email", &existing.email)
            .delete()
            .await
        {
            warn!(email = %existing.email, error = %e, "failed to remove user row for deleted customer");
        }
    }

    Ok(Json(json!({ "message": "Akun pelanggan berhasil dihapus." })))
}
