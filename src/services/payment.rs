//! Payment confirmation coordinator.
//!
//! Resolves a holding booking to a terminal state from a gateway callback or
//! a balance debit. Confirmation replays against a booking already in a
//! terminal state are no-ops, so duplicate callbacks and client retries are
//! harmless.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::gateway::SignatureScheme;
use crate::models::{Booking, BookingStatus, PaymentMethod};
use crate::store::{Store, TransitionOutcome};
use crate::utils::error::AppError;
use crate::wallet::{BalanceStore, CreditOutcome, DebitOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayCallback {
    pub order_ref: String,
    pub payment_ref: String,
    pub signature: String,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    wallet: Arc<dyn BalanceStore>,
    signatures: SignatureScheme,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        wallet: Arc<dyn BalanceStore>,
        signatures: SignatureScheme,
    ) -> Self {
        Self {
            store,
            wallet,
            signatures,
        }
    }

    /// Gateway success callback: verify the signature, then confirm the hold.
    pub async fn confirm_gateway_callback(
        &self,
        callback: &GatewayCallback,
    ) -> Result<Booking, AppError> {
        let booking = self
            .store
            .booking_by_order_ref(&callback.order_ref)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No booking for gateway order '{}'",
                    callback.order_ref
                ))
            })?;

        if !self
            .signatures
            .verify(&callback.order_ref, &callback.payment_ref, &callback.signature)
        {
            return Err(AppError::PaymentVerification(format!(
                "Signature mismatch for gateway order '{}'",
                callback.order_ref
            )));
        }

        match self
            .store
            .transition_if_holding(booking.id, BookingStatus::Confirmed)
            .await?
        {
            TransitionOutcome::Applied { booking, .. } => {
                tracing::info!(booking_id = %booking.id, "Booking confirmed via gateway");
                Ok(booking)
            }
            TransitionOutcome::Lost(status) => {
                // A sweep, cancellation or an earlier callback already
                // resolved this booking; replaying is a no-op.
                tracing::debug!(
                    booking_id = %booking.id,
                    status = status.as_str(),
                    "Duplicate gateway confirmation ignored"
                );
                self.current(booking.id).await
            }
        }
    }

    /// Explicit payment-failure signal from the gateway. Releases the
    /// reserved capacity in the same atomic unit as the status change: a
    /// failed booking must not keep its tickets counted against the tiers,
    /// or the ledger invariant (sold = holding + confirmed quantities) would
    /// break.
    pub async fn mark_payment_failed(&self, order_ref: &str) -> Result<Booking, AppError> {
        let booking = self
            .store
            .booking_by_order_ref(order_ref)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No booking for gateway order '{order_ref}'"))
            })?;

        match self
            .store
            .release_and_transition(booking.id, &[BookingStatus::Holding], BookingStatus::Failed)
            .await?
        {
            TransitionOutcome::Applied { booking, .. } => {
                tracing::info!(booking_id = %booking.id, "Booking failed, capacity released");
                Ok(booking)
            }
            TransitionOutcome::Lost(BookingStatus::Failed) => self.current(booking.id).await,
            TransitionOutcome::Lost(status) => Err(AppError::InvalidStateTransition(format!(
                "Booking {} is {}, cannot mark failed",
                booking.id,
                status.as_str()
            ))),
        }
    }

    /// Balance path: debit the booking's total, then confirm the hold. A
    /// failed debit leaves the booking holding and the ledger untouched.
    pub async fn confirm_with_balance(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} was not found")))?;

        if booking.status.is_terminal() {
            // Idempotence guard: re-invocation on a resolved booking is a
            // no-op, not an error.
            return Ok(booking);
        }

        if booking.payment_method != PaymentMethod::Balance {
            return Err(AppError::ValidationError(format!(
                "Booking {booking_id} is not payable from balance"
            )));
        }

        match self.wallet.debit(booking.user_id, booking.total_amount).await? {
            DebitOutcome::Success => {}
            DebitOutcome::InsufficientFunds => {
                return Err(AppError::InsufficientFunds(format!(
                    "Balance of user {} cannot cover {}",
                    booking.user_id, booking.total_amount
                )));
            }
            DebitOutcome::NotFound => {
                return Err(AppError::NotFound(format!(
                    "No wallet for user {}",
                    booking.user_id
                )));
            }
        }

        match self
            .store
            .transition_if_holding(booking.id, BookingStatus::Confirmed)
            .await?
        {
            TransitionOutcome::Applied { booking, .. } => {
                tracing::info!(booking_id = %booking.id, "Booking confirmed via balance");
                Ok(booking)
            }
            TransitionOutcome::Lost(status) => {
                // The hold was resolved (swept or cancelled) between the
                // debit and the confirmation; give the money back.
                let credited = self
                    .wallet
                    .credit(booking.user_id, booking.total_amount)
                    .await;
                match credited {
                    Ok(CreditOutcome::Success) => {}
                    other => {
                        tracing::warn!(
                            booking_id = %booking.id,
                            user_id = %booking.user_id,
                            outcome = ?other,
                            "Failed to compensate debit after lost confirmation race"
                        );
                    }
                }
                Err(AppError::InvalidStateTransition(format!(
                    "Booking {} resolved to {} during payment",
                    booking.id,
                    status.as_str()
                )))
            }
        }
    }

    async fn current(&self, id: Uuid) -> Result<Booking, AppError> {
        self.store
            .booking(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {id} was not found")))
    }
}
