//! Cancellation/refund coordinator.
//!
//! Cancellation is allowed from `Holding` and `Confirmed` only. The ledger
//! reversal and the status change share one atomic unit; the refund credit
//! is a best-effort follow-up issued after that unit commits (a credit
//! failure is logged for reconciliation, not rolled back).

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Booking, BookingStatus};
use crate::store::{Store, TransitionOutcome};
use crate::utils::error::AppError;
use crate::wallet::{BalanceStore, CreditOutcome};

#[derive(Clone)]
pub struct CancellationService {
    store: Arc<dyn Store>,
    wallet: Arc<dyn BalanceStore>,
}

impl CancellationService {
    pub fn new(store: Arc<dyn Store>, wallet: Arc<dyn BalanceStore>) -> Self {
        Self { store, wallet }
    }

    pub async fn cancel(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        let outcome = self
            .store
            .release_and_transition(
                booking_id,
                &[BookingStatus::Holding, BookingStatus::Confirmed],
                BookingStatus::Cancelled,
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied { booking, from } => {
                tracing::info!(
                    booking_id = %booking.id,
                    from = from.as_str(),
                    "Booking cancelled, capacity released"
                );

                // Only confirmed bookings have been charged; holds were not.
                if from == BookingStatus::Confirmed {
                    self.refund(&booking).await;
                }

                Ok(booking)
            }
            TransitionOutcome::Lost(status) => Err(AppError::InvalidStateTransition(format!(
                "Booking {booking_id} is {}, cannot cancel",
                status.as_str()
            ))),
        }
    }

    async fn refund(&self, booking: &Booking) {
        match self
            .wallet
            .credit(booking.user_id, booking.total_amount)
            .await
        {
            Ok(CreditOutcome::Success) => {
                tracing::info!(
                    booking_id = %booking.id,
                    user_id = %booking.user_id,
                    amount = %booking.total_amount,
                    "Refund credited"
                );
            }
            Ok(CreditOutcome::NotFound) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    user_id = %booking.user_id,
                    amount = %booking.total_amount,
                    "Refund skipped: no wallet for user; needs reconciliation"
                );
            }
            Err(err) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    user_id = %booking.user_id,
                    amount = %booking.total_amount,
                    error = %err,
                    "Refund credit failed after cancellation; needs reconciliation"
                );
            }
        }
    }
}
