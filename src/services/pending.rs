use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backend::Backend;

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Background poller feeding the back-office badge: how many bookings
/// are waiting for staff confirmation. The loop ends when the last
/// receiver is dropped.
pub fn spawn_pending_counter(backend: Backend) -> watch::Receiver<i64> {
    let (tx, rx) = watch::channel(0i64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            match backend
                .table("transaksi")
                .eq("status_transaksi", "konfirmasi")
                .count()
                .await
            {
                Ok(count) => {
                    debug!(count, "refreshed pending booking count");
                    tx.send_replace(count);
                }
                Err(e) => {
                    warn!(error = %e, "pending booking count poll failed");
                    tx.send_replace(0);
                }
            }
        }
    });
    rx
}
