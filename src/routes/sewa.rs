use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::MaybeSession;
use crate::models::mobil::Mobil;
use crate::models::pelanggan::Pelanggan;
use crate::models::role::Role;
use crate::models::transaksi::BookingRequest;
use crate::routes::{bad_request, internal_error, not_found};
use crate::services::booking::{self, BookingError};
use crate::AppState;

/// Place a rental order for one car. Customers book for themselves;
/// staff can book on behalf of a walk-in customer.
pub async fn create(
    State(state): State<AppState>,
    Path(id_mobil): Path<i64>,
    session: MaybeSession,
    Json(body): Json<BookingRequest>,
) -> Result<(StatusCode, Json<Value>), Response> {
    let ctx = session.protect(&[Role::Pelanggan, Role::Petugas]).await?;
    let snap = ctx.store.snapshot().await;
    let role = snap.role.unwrap_or(Role::Pelanggan);

    let mobil: Option<Mobil> = state
        .backend
        .table("mobil")
        .select("*")
        .eq("id_mobil", id_mobil)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    let mobil = mobil.ok_or_else(|| not_found("Mobil tidak ditemukan").into_response())?;

    let pelanggan = match (role, &body.pelanggan) {
        // Staff at the counter key in the customer's details.
        (Role::Petugas, Some(data)) => {
            if data.nama.trim().is_empty()
                || data.no_identitas.trim().is_empty()
                || data.no_hp.trim().is_empty()
                || data.email.trim().is_empty()
            {
                return Err(bad_request("Mohon lengkapi semua data pelanggan.").into_response());
            }
            booking::find_or_create_pelanggan(&state.backend, data)
                .await
                .map_err(|e| internal_error(e).into_response())?
        }
        (Role::Petugas, None) => {
            return Err(bad_request("Mohon lengkapi semua data pelanggan.").into_response())
        }
        // Customers book against their own profile.
        _ => {
            let email = snap
                .user
                .as_ref()
                .map(|u| u.email.clone())
                .unwrap_or_default();
            let profile: Option<Pelanggan> = state
                .backend
                .table("pelanggan")
                .select("*")
                .eq("email", &email)
                .fetch_optional()
                .await
                .map_err(|e| internal_error(e).into_response())?;
            let profile = profile.ok_or_else(|| {
                bad_request("Data pelanggan belum lengkap. Harap lengkapi profil sebelum memesan.")
                    .into_response()
            })?;
            if profile.no_identitas.trim().is_empty() {
                return Err(bad_request(
                    "Nomor identitas belum tersedia. Lengkapi profil Anda terlebih dahulu.",
                )
                .into_response());
            }
            profile
        }
    };

    let quote = booking::quote(mobil.harga_sewa_harian, body.tanggal_sewa, body.tanggal_kembali)
        .map_err(|e| match e {
            BookingError::InvalidDateRange => bad_request(e.to_string()).into_response(),
            BookingError::Backend(_) => internal_error(e).into_response(),
        })?;

    let transaksi = booking::create_booking(
        &state.backend,
        mobil.id_mobil,
        pelanggan.id_pelanggan,
        body.tanggal_sewa,
        body.tanggal_kembali,
        quote.total_harga,
    )
    .await
    .map_err(|e| internal_error(e).into_response())?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "transaksi": transaksi,
            "total_hari": quote.total_hari,
            "total_harga": quote.total_harga,
        })),
    ))
}

