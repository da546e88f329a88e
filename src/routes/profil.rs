use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::middleware::MaybeSession;
use crate::models::pelanggan::{Pelanggan, PelangganForm};
use crate::models::role::Role;
use crate::routes::{internal_error, ApiError};
use crate::AppState;

async fn profile_by_email(
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

/// The caller's email and access token, once the guard passes.
async fn caller_identity(session: &MaybeSession) -> Result<(String, Option<String>), Response> {
    let ctx = session.protect(&[Role::Pelanggan]).await?;
    let snap = ctx.store.snapshot().await;
    let email = snap
        .user
        .as_ref()
        .map(|u| u.email.clone())
        .unwrap_or_default();
    Ok((email, ctx.access_token().await))
}

pub async fn get(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    let (email, token) = caller_identity(&session).await?;
    let profile = profile_by_email(&state, token, &email)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(json!({ "email": email, "pelanggan": profile })))
}

/// Upsert the caller's profile: update the row matched by email, or
/// register a fresh one dated today.
pub async fn update(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(body): Json<PelangganForm>,
) -> Result<Json<Value>, Response> {
    let (email, token) = caller_identity(&session).await?;
    let existing = profile_by_email(&state, token.clone(), &email)
        .await
        .map_err(IntoResponse::into_response)?;

    match existing {
        Some(found) => {
            state
                .backend
                .table("pelanggan")
                .maybe_auth(token)
                .eq("id_pelanggan", found.id_pelanggan)
                .update(json!({
                    "nama": body.nama,
                    "no_identitas": body.no_identitas,
                    "no_hp": body.no_hp,
                    "alamat": body.alamat,
                }))
                .await
                .map_err(|e| internal_error(e).into_response())?;
            Ok(Json(json!({ "message": "Profil berhasil diupdate!" })))
        }
        None => {
            let inserted: Vec<Pelanggan> = state
                .backend
                .table("pelanggan")
                .maybe_auth(token)
                .insert(&json!([{
                    "nama": body.nama,
                    "no_identitas": body.no_identitas,
                    "no_hp": body.no_hp,
                    "alamat": body.alamat,
                    "email": email,
                    "tanggal_daftar": Utc::now().date_naive(),
                }]))
                .await
                .map_err(|e| internal_error(e).into_response())?;
            Ok(Json(json!({
                "message": "Profil berhasil disimpan!",
                "pelanggan": inserted.first(),
            })))
        }
    }
}
