//! In-memory store for development and tests.
//!
//! One async mutex guards the whole ledger, so every operation is trivially
//! all-or-nothing and the concurrency semantics match the Postgres
//! implementation: a request either sees the state before another committed
//! operation or after it, never in between.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, BookingTicket, TicketTier};
use crate::store::{NewBooking, Store, TransitionOutcome};
use crate::utils::error::AppError;

#[derive(Default)]
struct Inner {
    tiers: HashMap<Uuid, TicketTier>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Vec<BookingTicket>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tier into the ledger.
    pub async fn insert_tier(&self, tier: TicketTier) {
        let mut inner = self.inner.lock().await;
        inner.tiers.insert(tier.id, tier);
    }

    /// Current state of a tier, for assertions.
    pub async fn tier(&self, id: Uuid) -> Option<TicketTier> {
        let inner = self.inner.lock().await;
        inner.tiers.get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn tiers_for_event(&self, event_id: Uuid) -> Result<Vec<TicketTier>, AppError> {
        let inner = self.inner.lock().await;
        let mut tiers: Vec<TicketTier> = inner
            .tiers
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        tiers.sort_by_key(|t| t.position);
        Ok(tiers)
    }

    async fn create_booking(&self, new: NewBooking) -> Result<Booking, AppError> {
        let mut inner = self.inner.lock().await;

        // Re-verify every line before touching any counter.
        for line in &new.lines {
            let tier = inner.tiers.get(&line.tier_id).ok_or_else(|| {
                AppError::NotFound(format!("Tier {} was not found", line.tier_id))
            })?;
            if tier.event_id != new.event_id || tier.sold + line.quantity > tier.capacity {
                return Err(AppError::InsufficientInventory(format!(
                    "Tier {} cannot supply {} ticket(s)",
                    line.tier_id, line.quantity
                )));
            }
        }

        for line in &new.lines {
            let tier = inner
                .tiers
                .get_mut(&line.tier_id)
                .expect("tier verified above");
            tier.sold += line.quantity;
            tier.updated_at = Utc::now();
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            event_id: new.event_id,
            total_amount: new.total_amount,
            status: BookingStatus::Holding,
            payment_method: new.payment_method,
            gateway_order_ref: new.gateway_order_ref,
            hold_expires_at: new.hold_expires_at,
            created_at: now,
            updated_at: now,
        };

        let lines = new
            .lines
            .iter()
            .enumerate()
            .map(|(position, line)| BookingTicket {
                booking_id: booking.id,
                tier_id: line.tier_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                position: position as i32,
            })
            .collect();

        inner.tickets.insert(booking.id, lines);
        inner.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.bookings.get(&id).cloned())
    }

    async fn booking_by_order_ref(&self, order_ref: &str) -> Result<Option<Booking>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bookings
            .values()
            .find(|b| b.gateway_order_ref.as_deref() == Some(order_ref))
            .cloned())
    }

    async fn booking_tickets(&self, id: Uuid) -> Result<Vec<BookingTicket>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.tickets.get(&id).cloned().unwrap_or_default())
    }

    async fn transition_if_holding(
        &self,
        id: Uuid,
        to: BookingStatus,
    ) -> Result<TransitionOutcome, AppError> {
        if !BookingStatus::Holding.can_transition_to(to) {
            return Err(AppError::InvalidStateTransition(format!(
                "holding -> {} is not a permitted transition",
                to.as_str()
            )));
        }

        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Booking {id} was not found")))?;

        if booking.status != BookingStatus::Holding {
            return Ok(TransitionOutcome::Lost(booking.status));
        }

        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied {
            booking: booking.clone(),
            from: BookingStatus::Holding,
        })
    }

    async fn release_and_transition(
        &self,
        id: Uuid,
        allowed_from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<TransitionOutcome, AppError> {
        let mut inner = self.inner.lock().await;

        let status = inner
            .bookings
            .get(&id)
            .map(|b| b.status)
            .ok_or_else(|| AppError::NotFound(format!("Booking {id} was not found")))?;

        if !allowed_from.contains(&status) {
            return Ok(TransitionOutcome::Lost(status));
        }

        if !status.can_transition_to(to) {
            return Err(AppError::InvalidStateTransition(format!(
                "{} -> {} is not a permitted transition",
                status.as_str(),
                to.as_str()
            )));
        }

        let lines = inner.tickets.get(&id).cloned().unwrap_or_default();
        for line in &lines {
            let tier = inner.tiers.get(&line.tier_id);
            if tier.map_or(true, |t| t.sold - line.quantity < 0) {
                return Err(AppError::InternalServerError(format!(
                    "Ledger underflow releasing tier {} for booking {id}",
                    line.tier_id
                )));
            }
        }

        for line in &lines {
            let tier = inner
                .tiers
                .get_mut(&line.tier_id)
                .expect("tier verified above");
            tier.sold -= line.quantity;
            tier.updated_at = Utc::now();
        }

        let booking = inner.bookings.get_mut(&id).expect("booking read above");
        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied {
            booking: booking.clone(),
            from: status,
        })
    }

    async fn expired_holdings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, AppError> {
        let inner = self.inner.lock().await;
        let mut expired: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Holding && b.hold_expires_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.hold_expires_at);
        Ok(expired)
    }
}
