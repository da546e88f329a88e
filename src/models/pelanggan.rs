use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Row in the `pelanggan` customer-profile table. One profile per
/// email; lookups use find-or-create semantics, nothing stronger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pelanggan {
    pub id_pelanggan: i64,
    pub nama: String,
    pub no_identitas: String,
    pub no_hp: String,
    #[serde(default)]
    pub alamat: Option<String>,
    pub email: String,
    pub tanggal_daftar: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PelangganForm {
    pub nama: String,
    pub no_identitas: String,
    pub no_hp: String,
    #[serde(default)]
    pub alamat: Option<String>,
    pub email: String,
}

/// Walk-in customer details a staff member keys in while booking on
/// someone's behalf.
#[derive(Debug, Clone, Deserialize)]
pub struct WalkInPelanggan {
    pub nama: String,
    pub no_identitas: String,
    pub no_hp: String,
    pub email: String,
}
