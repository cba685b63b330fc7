//! Postgres-backed store.
//!
//! Tier counters are only ever moved by conditional updates whose predicate
//! keeps `sold` inside `[0, capacity]`; a predicate miss means the request
//! lost a race or asked for more than is left, and the enclosing transaction
//! rolls back. Status transitions are single-statement compare-and-sets, or
//! `SELECT ... FOR UPDATE` re-reads where tier rows move in the same
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, BookingTicket, TicketTier};
use crate::store::{NewBooking, Store, TransitionOutcome};
use crate::utils::error::AppError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn tiers_for_event(&self, event_id: Uuid) -> Result<Vec<TicketTier>, AppError> {
        let tiers = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers WHERE event_id = $1 ORDER BY position",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers)
    }

    async fn create_booking(&self, new: NewBooking) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await?;

        for line in &new.lines {
            let result = sqlx::query(
                "UPDATE ticket_tiers \
                 SET sold = sold + $1, updated_at = now() \
                 WHERE id = $2 AND event_id = $3 AND sold + $1 <= capacity",
            )
            .bind(line.quantity)
            .bind(line.tier_id)
            .bind(new.event_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(AppError::InsufficientInventory(format!(
                    "Tier {} cannot supply {} ticket(s)",
                    line.tier_id, line.quantity
                )));
            }
        }

        let booking = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings \
             (id, user_id, event_id, total_amount, status, payment_method, gateway_order_ref, hold_expires_at) \
             VALUES ($1, $2, $3, $4, 'holding', $5, $6, $7) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.event_id)
        .bind(new.total_amount)
        .bind(new.payment_method)
        .bind(new.gateway_order_ref.as_deref())
        .bind(new.hold_expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for (position, line) in new.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO booking_tickets (booking_id, tier_id, quantity, unit_price, position) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(booking.id)
            .bind(line.tier_id)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(booking)
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(booking)
    }

    async fn booking_by_order_ref(&self, order_ref: &str) -> Result<Option<Booking>, AppError> {
        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE gateway_order_ref = $1")
                .bind(order_ref)
                .fetch_optional(&self.pool)
                .await?;

        Ok(booking)
    }

    async fn booking_tickets(&self, id: Uuid) -> Result<Vec<BookingTicket>, AppError> {
        let tickets = sqlx::query_as::<_, BookingTicket>(
            "SELECT * FROM booking_tickets WHERE booking_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
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

        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $2, updated_at = now() \
             WHERE id = $1 AND status = 'holding' \
             RETURNING *",
        )
        .bind(id)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(booking) = updated {
            return Ok(TransitionOutcome::Applied {
                booking,
                from: BookingStatus::Holding,
            });
        }

        let current = self
            .booking(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {id} was not found")))?;

        Ok(TransitionOutcome::Lost(current.status))
    }

    async fn release_and_transition(
        &self,
        id: Uuid,
        allowed_from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<TransitionOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Booking {id} was not found")))?;

        if !allowed_from.contains(&booking.status) {
            tx.rollback().await?;
            return Ok(TransitionOutcome::Lost(booking.status));
        }

        if !booking.status.can_transition_to(to) {
            tx.rollback().await?;
            return Err(AppError::InvalidStateTransition(format!(
                "{} -> {} is not a permitted transition",
                booking.status.as_str(),
                to.as_str()
            )));
        }

        let tickets = sqlx::query_as::<_, BookingTicket>(
            "SELECT * FROM booking_tickets WHERE booking_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        for line in &tickets {
            let result = sqlx::query(
                "UPDATE ticket_tiers \
                 SET sold = sold - $1, updated_at = now() \
                 WHERE id = $2 AND sold - $1 >= 0",
            )
            .bind(line.quantity)
            .bind(line.tier_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(AppError::InternalServerError(format!(
                    "Ledger underflow releasing tier {} for booking {id}",
                    line.tier_id
                )));
            }
        }

        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(to)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(TransitionOutcome::Applied {
            booking: updated,
            from: booking.status,
        })
    }

    async fn expired_holdings(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>, AppError> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings \
             WHERE status = 'holding' AND hold_expires_at < $1 \
             ORDER BY hold_expires_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }
}
