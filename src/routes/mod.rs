pub mod auth;
pub mod catalog;
pub mod health;
pub mod laporan;
pub mod mobil;
pub mod pelanggan;
pub mod pesanan;
pub mod profil;
pub mod sewa;
pub mod transaksi;
pub mod users;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub type ApiError = (StatusCode, Json<Value>);

pub fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "backend call failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": message.into() })),
    )
}

pub fn conflict(message: impl Into<String>) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": message.into() })),
    )
}
