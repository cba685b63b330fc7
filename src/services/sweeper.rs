//! Expiry sweeper.
//!
//! A periodic task that finds holding bookings whose hold lapsed and
//! releases their capacity. It is not special-cased logic: each release goes
//! through the same atomic `release_and_transition` operation as the
//! request-driven paths, so a confirmation that commits first simply wins
//! and the sweep skips that booking. Release latency is bounded by the
//! sweep interval, not exact at `hold_expires_at`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::models::BookingStatus;
use crate::store::{Store, TransitionOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub released: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run the sweep loop forever. Spawned as a background task from `main`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let stats = self.sweep_once().await;
            if stats != SweepStats::default() {
                tracing::info!(
                    released = stats.released,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    "Expiry sweep finished"
                );
            }
        }
    }

    /// One sweep pass. Per-booking failures are independent: a booking that
    /// cannot be released is logged and retried on the next run, and never
    /// blocks the rest of the batch.
    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();

        let expired = match self.store.expired_holdings(Utc::now()).await {
            Ok(expired) => expired,
            Err(err) => {
                tracing::warn!(error = %err, "Expiry sweep could not list expired holds");
                stats.failed += 1;
                return stats;
            }
        };

        for booking in expired {
            let outcome = self
                .store
                .release_and_transition(
                    booking.id,
                    &[BookingStatus::Holding],
                    BookingStatus::Expired,
                )
                .await;

            match outcome {
                Ok(TransitionOutcome::Applied { .. }) => {
                    tracing::info!(booking_id = %booking.id, "Expired hold released");
                    stats.released += 1;
                }
                Ok(TransitionOutcome::Lost(status)) => {
                    // A confirmation or cancellation won the race.
                    tracing::debug!(
                        booking_id = %booking.id,
                        status = status.as_str(),
                        "Hold already resolved, sweep skipped"
                    );
                    stats.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        booking_id = %booking.id,
                        error = %err,
                        "Failed to release expired hold; will retry next sweep"
                    );
                    stats.failed += 1;
                }
            }
        }

        stats
    }
}
