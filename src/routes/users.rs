use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::MaybeSession;
use crate::models::role::Role;
use crate::models::user::{CreateStaffRequest, UpdateStaffRequest, UserAccount};
use crate::routes::{bad_request, internal_error, not_found};
use crate::services::staff::{StaffCreationError, StaffCreationOutcome, StaffSaga};
use crate::AppState;

/// Back-office account list: staff and admins only, never customers.
pub async fn list(
    State(state): State<AppState>,
    session: MaybeSession,
) -> Result<Json<Vec<UserAccount>>, Response> {
    session.protect(&[Role::Admin]).await?;
    let users: Vec<UserAccount> = state
        .backend
        .table("user")
        .select("*")
        .filter("role", "in", "(petugas,admin)")
        .order("id", false)
        .fetch_all()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    Ok(Json(users))
}

/// Provision a staff account without the admin losing their session.
pub async fn create(
    State(_state): State<AppState>,
    session: MaybeSession,
    Json(body): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<Value>), Response> {
    let ctx = session.protect(&[Role::Admin]).await?;

    if body.password != body.confirm_password {
        return Err(bad_request("Password tidak cocok!").into_response());
    }
    if body.role == Role::Pelanggan {
        return Err(bad_request("Role harus petugas atau admin.").into_response());
    }

    let saga = StaffSaga::new(ctx.auth.clone(), ctx.directory.clone());
    match saga
        .create_staff_account(&body.email, &body.password, body.role)
        .await
    {
        Ok(StaffCreationOutcome::Completed) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "message": "User berhasil dibuat! Data tersimpan di tabel user.",
            })),
        )),
        // The account exists; the admin has to sign in again.
        Ok(StaffCreationOutcome::ReloadRequired) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "message": "User berhasil dibuat! Memuat ulang halaman...",
                "reload": true,
            })),
        )),
        Err(e @ StaffCreationError::NoActiveSession) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response()),
        Err(e @ StaffCreationError::SignUp(_)) => {
            Err(bad_request(e.to_string()).into_response())
        }
        Err(e @ StaffCreationError::AccountRow(_)) => {
            Err(internal_error(e).into_response())
        }
    }
}

/// Editing an existing account only ever changes its role.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    session: MaybeSession,
    Json(body): Json<UpdateStaffRequest>,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin]).await?;

    let existing: Option<UserAccount> = state
        .backend
        .table("user")
        .select("*")
        .eq("id", id)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    if existing.is_none() {
        return Err(not_found("User tidak ditemukan").into_response());
    }

    state
        .backend
        .table("user")
        .eq("id", id)
        .update(json!({ "role": body.role }))
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({ "message": "User berhasil diupdate!" })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin]).await?;

    state
        .backend
        .table("user")
        .eq("id", id)
        .delete()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({ "message": "User berhasil dihapus!" })))
}
