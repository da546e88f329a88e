use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use crate::backend::{Backend, BackendError};
use crate::models::pelanggan::{Pelanggan, WalkInPelanggan};
use crate::models::transaksi::Transaksi;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Tanggal kembali harus setelah tanggal sewa.")]
    InvalidDateRange,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Quote {
    pub total_hari: i64,
    pub total_harga: i64,
}

/// Whole days between pick-up and return. Same-day and inverted
/// ranges are rejected before any price math.
pub fn rental_days(sewa: NaiveDate, kembali: NaiveDate) -> Result<i64, BookingError> {
    let days = (kembali - sewa).num_days();
    if days <= 0 {
        return Err(BookingError::InvalidDateRange);
    }
    Ok(days)
}

pub fn quote(
    harga_sewa_harian: i64,
    sewa: NaiveDate,
    kembali: NaiveDate,
) -> Result<Quote, BookingError> {
    let total_hari = rental_days(sewa, kembali)?;
    Ok(Quote {
        total_hari,
        total_harga: total_hari * harga_sewa_harian,
    })
}

/// Walk-in counter flow: reuse the profile matched by email, refreshing
/// its contact fields, or register a new one dated today.
pub async fn find_or_create_pelanggan(
    backend: &Backend,
    data: &WalkInPelanggan,
) -> Result<Pelanggan, BookingError> {
    let existing: Option<Pelanggan> = backend
        .table("pelanggan")
        .select("*")
        .eq("email", &data.email)
        .fetch_optional()
        .await?;

    if let Some(found) = existing {
        backend
            .table("pelanggan")
            .eq("id_pelanggan", found.id_pelanggan)
            .update(json!({
                "nama": data.nama,
                "no_identitas": data.no_identitas,
                "no_hp": data.no_hp,
            }))
            .await?;
        return Ok(Pelanggan {
            nama: data.nama.clone(),
            no_identitas: data.no_identitas.clone(),
            no_hp: data.no_hp.clone(),
            ..found
        });
    }

    let mut inserted: Vec<Pelanggan> = backend
        .table("pelanggan")
        .insert(&json!([{
            "nama": data.nama,
            "no_identitas": data.no_identitas,
            "no_hp": data.no_hp,
            "email": data.email,
            "tanggal_daftar": Utc::now().date_naive(),
        }]))
        .await?;
    inserted.pop().ok_or_else(|| {
        BookingError::Backend(BackendError::Api {
            code: None,
            message: "insert pelanggan returned no row".into(),
        })
    })
}

/// New bookings always start life waiting for staff confirmation.
pub async fn create_booking(
    backend: &Backend,
    id_mobil: i64,
    id_pelanggan: i64,
    sewa: NaiveDate,
    kembali: NaiveDate,
    total_harga: i64,
) -> Result<Transaksi, BookingError> {
    let mut inserted: Vec<Transaksi> = backend
        .table("transaksi")
        .insert(&json!([{
            "id_mobil": id_mobil,
            "id_pelanggan": id_pelanggan,
            "tanggal_sewa": sewa,
            "tanggal_kembali": kembali,
            "total_harga": total_harga,
            "status_transaksi": "menunggu",
        }]))
        .await?;
    inserted.pop().ok_or_else(|| {
        BookingError::Backend(BackendError::Api {
            code: None,
            message: "insert transaksi returned no row".into(),
        })
    })
}
