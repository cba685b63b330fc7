//! Payment gateway seam.
//!
//! The core only needs three things from a gateway: create an externally
//! verifiable order for an amount, cancel an order the reservation path
//! abandoned, and verify that a callback really came from the gateway. The
//! signature scheme digests `order_ref|payment_ref|secret` with SHA-256 and
//! compares in constant time.

use std::sync::Arc;

use async_trait::async_trait;
use constant_time_eq::constant_time_eq;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::utils::error::AppError;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order for `amount`, returning its order reference.
    async fn create_order(&self, amount: Decimal) -> Result<String, AppError>;

    /// Cancel an order the caller no longer intends to settle. Best-effort:
    /// used by abort paths after order creation succeeded but the local
    /// reservation did not commit.
    async fn cancel_order(&self, order_ref: &str) -> Result<(), AppError>;
}

/// Recomputes and checks callback signatures with a shared secret.
#[derive(Clone)]
pub struct SignatureScheme {
    secret: String,
}

impl SignatureScheme {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, order_ref: &str, payment_ref: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(order_ref.as_bytes());
        hasher.update(b"|");
        hasher.update(payment_ref.as_bytes());
        hasher.update(b"|");
        hasher.update(self.secret.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Constant-time comparison against the recomputed signature, so a
    /// forged callback learns nothing from response timing.
    pub fn verify(&self, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        let expected = self.sign(order_ref, payment_ref);
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}

/// Mock gateway for development and tests. Always succeeds unless built with
/// [`MockGateway::failing`]; records cancelled order references so abort
/// paths can be asserted on.
#[derive(Clone, Default)]
pub struct MockGateway {
    fail_orders: bool,
    cancelled: Arc<Mutex<Vec<String>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose `create_order` always fails.
    pub fn failing() -> Self {
        Self {
            fail_orders: true,
            ..Self::default()
        }
    }

    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.cancelled.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, amount: Decimal) -> Result<String, AppError> {
        if self.fail_orders {
            return Err(AppError::ExternalServiceError(
                "Payment gateway rejected order creation".to_string(),
            ));
        }

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let order_ref = format!("order_{suffix}");

        tracing::debug!(%order_ref, %amount, "Mock gateway order created");
        Ok(order_ref)
    }

    async fn cancel_order(&self, order_ref: &str) -> Result<(), AppError> {
        self.cancelled.lock().await.push(order_ref.to_string());
        tracing::debug!(%order_ref, "Mock gateway order cancelled");
        Ok(())
    }
}
