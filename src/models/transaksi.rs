use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::mobil::Mobil;
use super::pelanggan::{Pelanggan, WalkInPelanggan};

/// Row in the `transaksi` table. The status stays a raw string here:
/// legacy rows may hold values outside the vocabulary and must still
/// render (flagged, fallback styling); writes go through the checked
/// transition path instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaksi {
    pub id_transaksi: i64,
    pub id_mobil: i64,
    pub id_pelanggan: i64,
    pub tanggal_sewa: NaiveDate,
    pub tanggal_kembali: NaiveDate,
    pub total_harga: i64,
    pub status_transaksi: String,
}

/// Transaction with its embedded relations, as PostgREST returns them
/// for `select("*, mobil(*), pelanggan(*)")`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransaksiDetail {
    #[serde(flatten)]
    pub transaksi: Transaksi,
    #[serde(default)]
    pub mobil: Option<Mobil>,
    #[serde(default)]
    pub pelanggan: Option<Pelanggan>,
}

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub tanggal_sewa: NaiveDate,
    pub tanggal_kembali: NaiveDate,
    /// Present only when a petugas books for a walk-in customer.
    #[serde(default)]
    pub pelanggan: Option<WalkInPelanggan>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}
