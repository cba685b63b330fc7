//! Internal balance store seam.
//!
//! Debits and credits are atomic from the core's point of view: the Postgres
//! implementation uses the same conditional-update discipline as the tier
//! ledger (`balance = balance - x` only where `balance >= x`), so two
//! concurrent debits can never both succeed past the available balance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Success,
    InsufficientFunds,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Success,
    NotFound,
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn debit(&self, user_id: Uuid, amount: Decimal) -> Result<DebitOutcome, AppError>;

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<CreditOutcome, AppError>;
}

#[derive(Clone)]
pub struct PgWallet {
    pool: PgPool,
}

impl PgWallet {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceStore for PgWallet {
    async fn debit(&self, user_id: Uuid, amount: Decimal) -> Result<DebitOutcome, AppError> {
        let result = sqlx::query(
            "UPDATE wallets \
             SET balance = balance - $1, updated_at = now() \
             WHERE user_id = $2 AND balance >= $1",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(DebitOutcome::Success);
        }

        let exists = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        if exists == 0 {
            Ok(DebitOutcome::NotFound)
        } else {
            Ok(DebitOutcome::InsufficientFunds)
        }
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<CreditOutcome, AppError> {
        let result = sqlx::query(
            "UPDATE wallets SET balance = balance + $1, updated_at = now() WHERE user_id = $2",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(CreditOutcome::Success)
        } else {
            Ok(CreditOutcome::NotFound)
        }
    }
}

/// In-memory wallet for development and tests.
#[derive(Clone, Default)]
pub struct MemoryWallet {
    balances: Arc<Mutex<HashMap<Uuid, Decimal>>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_balance(&self, user_id: Uuid, balance: Decimal) {
        self.balances.lock().await.insert(user_id, balance);
    }

    pub async fn balance(&self, user_id: Uuid) -> Option<Decimal> {
        self.balances.lock().await.get(&user_id).copied()
    }
}

#[async_trait]
impl BalanceStore for MemoryWallet {
    async fn debit(&self, user_id: Uuid, amount: Decimal) -> Result<DebitOutcome, AppError> {
        let mut balances = self.balances.lock().await;
        match balances.get_mut(&user_id) {
            None => Ok(DebitOutcome::NotFound),
            Some(balance) if *balance < amount => Ok(DebitOutcome::InsufficientFunds),
            Some(balance) => {
                *balance -= amount;
                Ok(DebitOutcome::Success)
            }
        }
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> Result<CreditOutcome, AppError> {
        let mut balances = self.balances.lock().await;
        match balances.get_mut(&user_id) {
            None => Ok(CreditOutcome::NotFound),
            Some(balance) => {
                *balance += amount;
                Ok(CreditOutcome::Success)
            }
        }
    }
}
