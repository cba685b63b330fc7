use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An event whose ticket inventory this service manages. Read-only from the
/// booking subsystem's perspective; only tier `sold` counters are mutated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A priced sub-allocation of an event's capacity.
///
/// `sold` counts tickets held by bookings currently in `Holding` or
/// `Confirmed`; it never leaves `[0, capacity]`. All mutations go through
/// conditional updates in the store, never read-then-write at this layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub capacity: i32,
    pub sold: i32,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    pub fn available(&self) -> i32 {
        self.capacity - self.sold
    }
}
