use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::middleware::MaybeSession;
use crate::models::role::Role;
use crate::models::status::TransaksiStatus;
use crate::models::transaksi::Transaksi;
use crate::routes::{bad_request, internal_error};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LaporanQuery {
    /// `YYYY-MM`; omitted means all time.
    pub bulan: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    total: usize,
    menunggu: usize,
    konfirmasi: usize,
    berlangsung: usize,
    selesai: usize,
    batal: usize,
    pendapatan: i64,
}

/// Revenue counts finished rentals only; money for bookings still in
/// flight or cancelled is not income.
fn summarize(rows: &[Transaksi]) -> Summary {
    let mut s = Summary {
        total: rows.len(),
        ..Summary::default()
    };
    for row in rows {
        match row.status_transaksi.parse::<TransaksiStatus>() {
            Ok(TransaksiStatus::Menunggu) => s.menunggu += 1,
            Ok(TransaksiStatus::Konfirmasi) => s.konfirmasi += 1,
            Ok(TransaksiStatus::Berlangsung) => s.berlangsung += 1,
            Ok(TransaksiStatus::Selesai) => {
                s.selesai += 1;
                s.pendapatan += row.total_harga;
            }
            Ok(TransaksiStatus::Batal) => s.batal += 1,
            Err(_) => {}
        }
    }
    s
}

fn month_bounds(bulan: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (year, month) = bulan.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

pub async fn report(
    State(state): State<AppState>,
    Query(query): Query<LaporanQuery>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin]).await?;

    let mut builder = state
        .backend
        .table("transaksi")
        .select("*")
        .order("id_transaksi", false);
    if let Some(bulan) = &query.bulan {
        let (start, end) = month_bounds(bulan)
            .ok_or_else(|| bad_request("Format bulan harus YYYY-MM").into_response())?;
        builder = builder.gte("tanggal_sewa", start).lt("tanggal_sewa", end);
    }
    let rows: Vec<Transaksi> = builder
        .fetch_all()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    let s = summarize(&rows);
    Ok(Json(json!({
        "bulan": query.bulan,
        "ringkasan": {
            "total_transaksi": s.total,
            "menunggu": s.menunggu,
            "konfirmasi": s.konfirmasi,
            "berlangsung": s.berlangsung,
            "selesai": s.selesai,
            "batal": s.batal,
            "total_pendapatan": s.pendapatan,
        },
        "transaksi": rows,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, total: i64) -> Transaksi {
        Transaksi {
            id_transaksi: 1,
            id_mobil: 1,
            id_pelanggan: 1,
            tanggal_sewa: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            tanggal_kembali: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
            total_harga: total,
            status_transaksi: status.to_string(),
        }
    }

    #[test]
    fn revenue_counts_only_finished_rentals() {
        let rows = vec![
            row("selesai", 700_000),
            row("selesai", 300_000),
            row("berlangsung", 500_000),
            row("batal", 400_000),
            row("sewa_khusus", 999_999),
        ];
        let s = summarize(&rows);
        assert_eq!(s.total, 5);
        assert_eq!(s.selesai, 2);
        assert_eq!(s.berlangsung, 1);
        assert_eq!(s.batal, 1);
        assert_eq!(s.pendapatan, 1_000_000);
    }

    #[test]
    fn month_bounds_handle_december_rollover() {
        let (start, end) = month_bounds("2024-12").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(month_bounds("2024-13").is_none());
        assert!(month_bounds("mei").is_none());
    }
}
