use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use crate::middleware::MaybeSession;
use crate::models::role::Role;
use crate::models::status::{self, Audience, TransaksiStatus};
use crate::models::transaksi::{TransaksiDetail, UpdateStatusRequest};
use crate::routes::{bad_request, conflict, internal_error, not_found};
use crate::AppState;

/// Back-office transaction table, newest first, with car and customer
/// rows embedded.
pub async fn list(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin, Role::Petugas]).await?;

    let rows: Vec<TransaksiDetail> = state
        .backend
        .table("transaksi")
        .select("*, mobil(*), pelanggan(*)")
        .order("id_transaksi", false)
        .fetch_all()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    let transaksi: Vec<Value> = rows
        .iter()
        .map(|d| {
            let raw = &d.transaksi.status_transaksi;
            json!({
                "transaksi": d,
                "status_label": status::label_for_raw(raw, Audience::Admin),
                "badge_class": status::badge_class_for_raw(raw),
            })
        })
        .collect();
    Ok(Json(json!({
        "transaksi": transaksi,
        "status_options": TransaksiStatus::options(true)
            .into_iter()
            .map(|(s, label)| json!({ "value": s, "label": label }))
            .collect::<Vec<_>>(),
    })))
}

/// Move one transaction through its lifecycle. Writes only accept the
/// canonical vocabulary (legacy synonyms are rewritten with a warning)
/// and only along the allowed transitions.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id_transaksi): Path<i64>,
    session: MaybeSession,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin, Role::Petugas]).await?;

    let (next, rewritten) = status::normalize(&body.status).ok_or_else(|| {
        bad_request(format!("Status tidak dikenal: {}", body.status)).into_response()
    })?;
    if rewritten {
        warn!(from = %body.status, to = %next, "normalized legacy status value on write");
    }

    let existing: Option<TransaksiDetail> = state
        .backend
        .table("transaksi")
        .select("*")
        .eq("id_transaksi", id_transaksi)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    let existing =
        existing.ok_or_else(|| not_found("Transaksi tidak ditemukan").into_response())?;

    let current = existing
        .transaksi
        .status_transaksi
        .parse::<TransaksiStatus>()
        .map_err(|_| {
            bad_request(format!(
                "Status tersimpan tidak dikenal: {}",
                existing.transaksi.status_transaksi
            ))
            .into_response()
        })?;

    if !current.can_transition_to(next) {
        return Err(conflict(format!(
            "Transisi status dari {current} ke {next} tidak diizinkan."
        ))
        .into_response());
    }

    state
        .backend
        .table("transaksi")
        .eq("id_transaksi", id_transaksi)
        .update(json!({ "status_transaksi": next }))
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({
        "message": "Status transaksi berhasil diupdate!",
        "status_transaksi": next,
    })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id_transaksi): Path<i64>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin]).await?;

    let existing: Option<TransaksiDetail> = state
        .backend
        .table("transaksi")
        .select("*")
        .eq("id_transaksi", id_transaksi)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    if existing.is_none() {
        return Err(not_found("Transaksi tidak ditemukan").into_response());
    }

    state
        .backend
        .table("transaksi")
        .eq("id_transaksi", id_transaksi)
        .delete()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({ "message": "Transaksi berhasil dihapus!" })))
}

/// Sidebar badge: the most recent polled count of bookings waiting for
/// confirmation.
pub async fn pending_count(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin]).await?;
    let count = *state.pending.borrow();
    Ok(Json(json!({ "pending": count })))
}
