use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobilStatus {
    Tersedia,
    Disewa,
}

impl std::fmt::Display for MobilStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MobilStatus::Tersedia => write!(f, "tersedia"),
            MobilStatus::Disewa => write!(f, "disewa"),
        }
    }
}

impl std::str::FromStr for MobilStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tersedia" => Ok(MobilStatus::Tersedia),
            "disewa" => Ok(MobilStatus::Disewa),
            _ => Err(anyhow::anyhow!("Status mobil tidak dikenal: {s}")),
        }
    }
}

/// Row in the `mobil` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mobil {
    pub id_mobil: i64,
    pub nama_mobil: String,
    pub tipe: String,
    pub merk: String,
    pub tahun: i32,
    pub harga_sewa_harian: i64,
    pub transmisi: String,
    pub kapasitas_mesin: String,
    pub status: MobilStatus,
    pub foto: Option<String>,
}

/// Fields of the vehicle form; the photo travels separately as a
/// multipart file part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobilForm {
    pub nama_mobil: String,
    pub tipe: String,
    pub merk: String,
    pub tahun: i32,
    pub harga_sewa_harian: i64,
    pub transmisi: String,
    pub kapasitas_mesin: String,
    pub status: MobilStatus,
}
