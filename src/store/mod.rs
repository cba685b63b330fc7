//! Persistence contracts for the booking subsystem.
//!
//! Every mutation the services need is exposed as a single atomic operation:
//! conditional increments on tier `sold` counters, compare-and-set status
//! transitions, and the combined release-and-transition used by the sweeper
//! and the cancellation path. Callers never do read-then-write across two
//! store calls; the race-sensitive re-read always happens inside the
//! operation itself.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, BookingTicket, PaymentMethod, TicketTier};
use crate::utils::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One line of a reservation request, already priced from the tier snapshot.
#[derive(Debug, Clone)]
pub struct BookingLine {
    pub tier_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Everything needed to create a booking in `Holding` as one atomic unit.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub lines: Vec<BookingLine>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub gateway_order_ref: Option<String>,
    pub hold_expires_at: DateTime<Utc>,
}

/// Result of a conditional status transition. `Applied` carries the status
/// the booking held when the transition committed, so callers can branch on
/// what they actually transitioned from; the loser of a race observes `Lost`
/// with whatever status the winner committed.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied {
        booking: Booking,
        from: BookingStatus,
    },
    Lost(BookingStatus),
}

impl TransitionOutcome {
    pub fn applied(&self) -> Option<&Booking> {
        match self {
            TransitionOutcome::Applied { booking, .. } => Some(booking),
            TransitionOutcome::Lost(_) => None,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Tiers of an event, in display order.
    async fn tiers_for_event(&self, event_id: Uuid) -> Result<Vec<TicketTier>, AppError>;

    /// Atomically re-verify availability, increment each tier's `sold` and
    /// insert the booking with its ticket lines in `Holding`. Any tier that
    /// cannot supply its quantity aborts the whole unit with
    /// `InsufficientInventory`; no partial increments survive.
    async fn create_booking(&self, new: NewBooking) -> Result<Booking, AppError>;

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError>;

    async fn booking_by_order_ref(&self, order_ref: &str) -> Result<Option<Booking>, AppError>;

    /// Ticket lines of a booking, in reservation order.
    async fn booking_tickets(&self, id: Uuid) -> Result<Vec<BookingTicket>, AppError>;

    /// Compare-and-set: move the booking to `to` only if it is still
    /// `Holding`. Does not touch tier counters.
    async fn transition_if_holding(
        &self,
        id: Uuid,
        to: BookingStatus,
    ) -> Result<TransitionOutcome, AppError>;

    /// Atomic release: re-read the booking under lock; if its status is in
    /// `allowed_from`, decrement each referenced tier's `sold` by the line
    /// quantities and set the status to `to` in the same transaction.
    /// Otherwise report `Lost` with the current status and change nothing.
    async fn release_and_transition(
        &self,
        id: Uuid,
        allowed_from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<TransitionOutcome, AppError>;

    /// All `Holding` bookings whose hold lapsed before `cutoff`.
    async fn expired_holdings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, AppError>;
}
