//! Reservation engine.
//!
//! Validates a ticket selection against the ledger, obtains a gateway order
//! when needed, and commits the hold as one atomic unit. The external order
//! is created immediately before the ledger transaction so the transaction
//! itself contains no external suspension points; if the ledger unit aborts
//! after an order exists, the order is cancelled best-effort.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::gateway::PaymentGateway;
use crate::models::{Booking, PaymentMethod};
use crate::store::{BookingLine, NewBooking, Store};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct TicketSelection {
    pub tier_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub tickets: Vec<TicketSelection>,
    pub payment_method: PaymentMethod,
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    hold_duration: Duration,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        hold_duration: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            hold_duration,
        }
    }

    /// Reserve tickets for a user. The whole request succeeds or fails; no
    /// partial reservation across tiers is ever committed.
    pub async fn reserve(&self, request: ReservationRequest) -> Result<Booking, AppError> {
        validate_selection(&request.tickets)?;

        let tiers = self.store.tiers_for_event(request.event_id).await?;
        if tiers.is_empty() {
            return Err(AppError::NotFound(format!(
                "Event {} was not found or has no ticket tiers",
                request.event_id
            )));
        }

        // Pre-check availability and snapshot unit prices. The authoritative
        // re-verification happens again inside the store transaction.
        let mut lines = Vec::with_capacity(request.tickets.len());
        for selection in &request.tickets {
            let tier = tiers
                .iter()
                .find(|t| t.id == selection.tier_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("Tier {} was not found", selection.tier_id))
                })?;

            if selection.quantity > tier.available() {
                return Err(AppError::InsufficientInventory(format!(
                    "Tier '{}' has {} ticket(s) left, {} requested",
                    tier.name,
                    tier.available(),
                    selection.quantity
                )));
            }

            lines.push(BookingLine {
                tier_id: tier.id,
                quantity: selection.quantity,
                unit_price: tier.price,
            });
        }

        let total_amount: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();

        let gateway_order_ref = match request.payment_method {
            PaymentMethod::Gateway => Some(self.gateway.create_order(total_amount).await?),
            PaymentMethod::Balance => None,
        };

        let new = NewBooking {
            user_id: request.user_id,
            event_id: request.event_id,
            lines,
            total_amount,
            payment_method: request.payment_method,
            gateway_order_ref: gateway_order_ref.clone(),
            hold_expires_at: Utc::now() + self.hold_duration,
        };

        match self.store.create_booking(new).await {
            Ok(booking) => {
                tracing::info!(
                    booking_id = %booking.id,
                    user_id = %booking.user_id,
                    event_id = %booking.event_id,
                    total = %booking.total_amount,
                    "Booking created in holding state"
                );
                Ok(booking)
            }
            Err(err) => {
                // The ledger unit rolled back; abandon the external order so
                // it cannot be settled against a booking that never existed.
                if let Some(order_ref) = gateway_order_ref {
                    if let Err(cancel_err) = self.gateway.cancel_order(&order_ref).await {
                        tracing::warn!(
                            %order_ref,
                            error = %cancel_err,
                            "Failed to cancel gateway order after aborted reservation"
                        );
                    }
                }
                Err(err)
            }
        }
    }
}

fn validate_selection(tickets: &[TicketSelection]) -> Result<(), AppError> {
    if tickets.is_empty() {
        return Err(AppError::ValidationError(
            "A reservation must request at least one ticket".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for selection in tickets {
        if selection.quantity < 1 {
            return Err(AppError::ValidationError(format!(
                "Quantity for tier {} must be at least 1",
                selection.tier_id
            )));
        }
        if !seen.insert(selection.tier_id) {
            return Err(AppError::ValidationError(format!(
                "Tier {} is listed more than once",
                selection.tier_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(quantity: i32) -> TicketSelection {
        TicketSelection {
            tier_id: Uuid::new_v4(),
            quantity,
        }
    }

    #[test]
    fn empty_selection_is_rejected() {
        assert!(matches!(
            validate_selection(&[]),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(matches!(
            validate_selection(&[selection(0)]),
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            validate_selection(&[selection(-3)]),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn duplicate_tiers_are_rejected() {
        let tier_id = Uuid::new_v4();
        let tickets = vec![
            TicketSelection { tier_id, quantity: 1 },
            TicketSelection { tier_id, quantity: 2 },
        ];
        assert!(matches!(
            validate_selection(&tickets),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn valid_selection_passes() {
        assert!(validate_selection(&[selection(1), selection(4)]).is_ok());
    }
}
