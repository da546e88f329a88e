use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::models::mobil::Mobil;
use crate::routes::{internal_error, not_found, ApiError};
use crate::AppState;

/// Public storefront catalog; no session required.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Mobil>>, ApiError> {
    let mobil: Vec<Mobil> = state
        .backend
        .table("mobil")
        .select("*")
        .order("id_mobil", true)
        .fetch_all()
        .await
        .map_err(internal_error)?;
    Ok(Json(mobil))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let mobil: Option<Mobil> = state
        .backend
        .table("mobil")
        .select("*")
        .eq("id_mobil", id)
        .fetch_optional()
        .await
        .map_err(internal_error)?;
    match mobil {
        Some(mobil) => Ok(Json(json!(mobil))),
        None => Err(not_found("Mobil tidak ditemukan")),
    }
}
