use serde::{Deserialize, Serialize};

/// Rental transaction lifecycle vocabulary. `Menunggu` is the fixed
/// status every new booking is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransaksiStatus {
    Menunggu,
    Konfirmasi,
    Berlangsung,
    Selesai,
    Batal,
}

/// Which label map a status renders through. Customers are shown
/// `konfirmasi` as "Menunggu" on purpose — confirmation is an internal
/// step they should not see as progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Admin,
    Customer,
}

impl std::fmt::Display for TransaksiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransaksiStatus::Menunggu => "menunggu",
            TransaksiStatus::Konfirmasi => "konfirmasi",
            TransaksiStatus::Berlangsung => "berlangsung",
            TransaksiStatus::Selesai => "selesai",
            TransaksiStatus::Batal => "batal",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TransaksiStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "menunggu" => Ok(TransaksiStatus::Menunggu),
            "konfirmasi" => Ok(TransaksiStatus::Konfirmasi),
            "berlangsung" => Ok(TransaksiStatus::Berlangsung),
            "selesai" => Ok(TransaksiStatus::Selesai),
            "batal" => Ok(TransaksiStatus::Batal),
            _ => Err(anyhow::anyhow!("Status tidak dikenal: {s}")),
        }
    }
}

impl TransaksiStatus {
    pub fn label(self, audience: Audience) -> &'static str {
        match audience {
            Audience::Admin => match self {
                TransaksiStatus::Menunggu => "Menunggu",
                TransaksiStatus::Konfirmasi => "Konfirmasi",
                TransaksiStatus::Berlangsung => "Berlangsung",
                TransaksiStatus::Selesai => "Selesai",
                TransaksiStatus::Batal => "Batal",
            },
            Audience::Customer => match self {
                TransaksiStatus::Menunggu => "Menunggu",
                TransaksiStatus::Konfirmasi => "Menunggu",
                TransaksiStatus::Berlangsung => "Sedang Berlangsung",
                TransaksiStatus::Selesai => "Selesai",
                TransaksiStatus::Batal => "Dibatalkan",
            },
        }
    }

    pub fn badge_class(self) -> &'static str {
        match self {
            TransaksiStatus::Menunggu | TransaksiStatus::Konfirmasi => {
                "bg-yellow-500/20 text-yellow-500"
            }
            TransaksiStatus::Berlangsung => "bg-blue-500/20 text-blue-500",
            TransaksiStatus::Selesai => "bg-green-500/20 text-green-500",
            TransaksiStatus::Batal => "bg-red-500/20 text-red-500",
        }
    }

    /// A booking can only be called off before it starts.
    pub fn is_cancelable(self) -> bool {
        matches!(self, TransaksiStatus::Menunggu | TransaksiStatus::Konfirmasi)
    }

    /// Checked transition table. `Selesai` and `Batal` are terminal.
    pub fn can_transition_to(self, next: TransaksiStatus) -> bool {
        use TransaksiStatus::*;
        matches!(
            (self, next),
            (Menunggu, Konfirmasi)
                | (Menunggu, Batal)
                | (Konfirmasi, Berlangsung)
                | (Konfirmasi, Batal)
                | (Berlangsung, Selesai)
        )
    }

    /// Admin dropdown entries, in the order the back office lists them.
    pub fn options(include_batal: bool) -> Vec<(TransaksiStatus, &'static str)> {
        use TransaksiStatus::*;
        let mut base = vec![
            (Konfirmasi, Konfirmasi.label(Audience::Admin)),
            (Menunggu, Menunggu.label(Audience::Admin)),
            (Berlangsung, Berlangsung.label(Audience::Admin)),
            (Selesai, Selesai.label(Audience::Admin)),
        ];
        if include_batal {
            base.push((Batal, Batal.label(Audience::Admin)));
        }
        base
    }
}

/// Labels for a raw persisted value. Anything outside the vocabulary is
/// flagged and rendered as-is instead of being rejected on read.
pub fn label_for_raw(raw: &str, audience: Audience) -> String {
    match raw.parse::<TransaksiStatus>() {
        Ok(status) => status.label(audience).to_string(),
        Err(_) => {
            tracing::warn!(status = raw, "transaksi status outside the vocabulary");
            raw.to_string()
        }
    }
}

pub fn badge_class_for_raw(raw: &str) -> &'static str {
    raw.parse::<TransaksiStatus>()
        .map(TransaksiStatus::badge_class)
        .unwrap_or("bg-gray-500/20 text-gray-400")
}

/// Map an incoming status value to the canonical vocabulary, accepting
/// the legacy synonyms older clients still send. Returns the parsed
/// status and whether a synonym was rewritten.
pub fn normalize(raw: &str) -> Option<(TransaksiStatus, bool)> {
    let trimmed = raw.trim().to_lowercase();
    if let Ok(status) = trimmed.parse::<TransaksiStatus>() {
        return Some((status, trimmed != raw));
    }
    let mapped = match trimmed.as_str() {
        "pending" => TransaksiStatus::Konfirmasi,
        "diproses" => TransaksiStatus::Berlangsung,
        "completed" => TransaksiStatus::Selesai,
        "cancelled" => TransaksiStatus::Batal,
        _ => return None,
    };
    Some((mapped, true))
}
