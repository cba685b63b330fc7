use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Booking lifecycle states. `Holding` is the only non-terminal state; every
/// other state is terminal and permits no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Holding,
    Confirmed,
    Failed,
    Expired,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Holding)
    }

    /// The transition relation of the booking state machine. Anything not
    /// listed here is rejected as an invalid state transition.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Holding, Confirmed)
                | (Holding, Failed)
                | (Holding, Expired)
                | (Holding, Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Holding => "holding",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    Balance,
}

/// A reservation of inventory, from creation in `Holding` through one of the
/// terminal states. `total_amount` is computed from price snapshots at
/// creation and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    /// Present only when `payment_method` is `Gateway`.
    pub gateway_order_ref: Option<String>,
    /// Meaningful only while `status` is `Holding`; enforced by the sweeper,
    /// not by a per-booking timer.
    pub hold_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a booking: a quantity of tickets in one tier, with the tier's
/// unit price snapshotted at reservation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingTicket {
    pub booking_id: Uuid,
    pub tier_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub position: i32,
}
