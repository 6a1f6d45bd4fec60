//! Pending-payment order reaper
//!
//! A failed or abandoned payment leaves an order in PENDING_PAYMENT with
//! its stock still reserved. This worker periodically cancels pending
//! orders older than the configured TTL, returning their items to stock
//! through the normal state machine. Each candidate is re-checked under
//! its order lock, so a payment that lands mid-scan always wins.

use tokio::time::{Duration, interval};
use tracing::{debug, error, info};

use crate::core::ServerState;

/// Background worker cancelling stale pending-payment orders
pub struct ExpiryWorker;

impl ExpiryWorker {
    /// Spawn the reaper loop. Errors are logged and the loop continues.
    pub fn spawn(state: ServerState) -> tokio::task::JoinHandle<()> {
        let scan_interval = Duration::from_secs(state.config.order_expiry_scan_secs.max(1));
        let ttl_minutes = state.config.order_expiry_minutes;

        tokio::spawn(async move {
            info!(
                ttl_minutes,
                scan_secs = scan_interval.as_secs(),
                "order expiry worker started"
            );
            let mut ticker = interval(scan_interval);
            loop {
                ticker.tick().await;
                Self::run_once(&state, ttl_minutes).await;
            }
        })
    }

    /// One scan pass: find and expire stale pending orders
    pub async fn run_once(state: &ServerState, ttl_minutes: i64) {
        let cutoff = shared::util::millis_ago(ttl_minutes);
        let service = state.order_service();

        let candidates = match service.expired_pending_orders(cutoff).await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "expiry scan failed");
                return;
            }
        };

        if candidates.is_empty() {
            return;
        }
        debug!(count = candidates.len(), "expiry scan found stale pending orders");

        for order in candidates {
            let order_id = order.id_string();
            match service.expire_pending(&order_id, cutoff).await {
                Ok(true) => {}
                // Raced with a payment or another transition — skip
                Ok(false) => debug!(order_id = %order_id, "order no longer expirable, skipped"),
                Err(e) => error!(order_id = %order_id, error = %e, "failed to expire order"),
            }
        }
    }
}
