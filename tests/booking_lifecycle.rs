//! End-to-end lifecycle tests over the in-memory store: reservation,
//! confirmation, expiry, cancellation, and the races between them.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use boxoffice_server::gateway::{MockGateway, PaymentGateway, SignatureScheme};
use boxoffice_server::models::{BookingStatus, PaymentMethod, TicketTier};
use boxoffice_server::services::{
    CancellationService, ExpirySweeper, GatewayCallback, PaymentService, ReservationRequest,
    ReservationService, TicketSelection,
};
use boxoffice_server::store::{MemoryStore, Store};
use boxoffice_server::utils::error::AppError;
use boxoffice_server::wallet::{BalanceStore, MemoryWallet};

const SECRET: &str = "test-secret";

struct Harness {
    store: MemoryStore,
    wallet: MemoryWallet,
    reservations: ReservationService,
    payments: PaymentService,
    cancellations: CancellationService,
    sweeper: ExpirySweeper,
    event_id: Uuid,
}

fn harness_with(gateway: MockGateway, hold: Duration) -> Harness {
    let store = MemoryStore::new();
    let wallet = MemoryWallet::new();
    let arc_store: Arc<dyn Store> = Arc::new(store.clone());
    let arc_wallet: Arc<dyn BalanceStore> = Arc::new(wallet.clone());
    let arc_gateway: Arc<dyn PaymentGateway> = Arc::new(gateway);

    Harness {
        reservations: ReservationService::new(arc_store.clone(), arc_gateway, hold),
        payments: PaymentService::new(
            arc_store.clone(),
            arc_wallet.clone(),
            SignatureScheme::new(SECRET),
        ),
        cancellations: CancellationService::new(arc_store.clone(), arc_wallet),
        sweeper: ExpirySweeper::new(arc_store, StdDuration::from_secs(60)),
        store,
        wallet,
        event_id: Uuid::new_v4(),
    }
}

fn harness() -> Harness {
    harness_with(MockGateway::new(), Duration::minutes(15))
}

/// A harness whose reservations are born already expired, so the sweeper
/// picks them up on its next pass.
fn harness_with_lapsed_holds() -> Harness {
    harness_with(MockGateway::new(), Duration::seconds(-1))
}

impl Harness {
    async fn seed_tier(&self, capacity: i32, sold: i32, price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .insert_tier(TicketTier {
                id,
                event_id: self.event_id,
                name: format!("tier-{id}"),
                price,
                capacity,
                sold,
                position: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;
        id
    }

    async fn sold(&self, tier_id: Uuid) -> i32 {
        self.store.tier(tier_id).await.expect("tier seeded").sold
    }

    fn request(
        &self,
        user_id: Uuid,
        tickets: Vec<(Uuid, i32)>,
        payment_method: PaymentMethod,
    ) -> ReservationRequest {
        ReservationRequest {
            user_id,
            event_id: self.event_id,
            tickets: tickets
                .into_iter()
                .map(|(tier_id, quantity)| TicketSelection { tier_id, quantity })
                .collect(),
            payment_method,
        }
    }
}

fn price_40() -> Decimal {
    Decimal::new(4000, 2)
}

fn callback_for(booking_order_ref: &str) -> GatewayCallback {
    let payment_ref = "pay_1".to_string();
    let signature = SignatureScheme::new(SECRET).sign(booking_order_ref, &payment_ref);
    GatewayCallback {
        order_ref: booking_order_ref.to_string(),
        payment_ref,
        signature,
    }
}

// Scenario A: capacity 10, sold 8. Asking for 3 is rejected without touching
// the ledger; asking for 2 fills the tier and holds the booking.
#[tokio::test]
async fn reservation_respects_remaining_capacity() {
    let h = harness();
    let tier = h.seed_tier(10, 8, price_40()).await;
    let user = Uuid::new_v4();

    let err = h
        .reservations
        .reserve(h.request(user, vec![(tier, 3)], PaymentMethod::Gateway))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory(_)));
    assert_eq!(h.sold(tier).await, 8);

    let booking = h
        .reservations
        .reserve(h.request(user, vec![(tier, 2)], PaymentMethod::Gateway))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Holding);
    assert_eq!(booking.total_amount, Decimal::new(8000, 2));
    assert!(booking.gateway_order_ref.is_some());
    assert!(booking.hold_expires_at > Utc::now());
    assert_eq!(h.sold(tier).await, 10);
}

#[tokio::test]
async fn unknown_tier_is_rejected_before_any_mutation() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;

    let err = h
        .reservations
        .reserve(h.request(
            Uuid::new_v4(),
            vec![(tier, 1), (Uuid::new_v4(), 1)],
            PaymentMethod::Balance,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.sold(tier).await, 0);
}

// Atomicity across tiers: if the second tier cannot supply its quantity the
// first tier's increment must not survive either.
#[tokio::test]
async fn multi_tier_reservation_is_all_or_nothing() {
    let h = harness();
    let roomy = h.seed_tier(100, 0, price_40()).await;
    let tight = h.seed_tier(10, 9, price_40()).await;

    let err = h
        .reservations
        .reserve(h.request(
            Uuid::new_v4(),
            vec![(roomy, 4), (tight, 2)],
            PaymentMethod::Balance,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory(_)));
    assert_eq!(h.sold(roomy).await, 0);
    assert_eq!(h.sold(tight).await, 9);
}

// Gateway order creation failing aborts the whole reservation with no ledger
// change on any tier.
#[tokio::test]
async fn gateway_order_failure_leaves_ledger_untouched() {
    let h = harness_with(MockGateway::failing(), Duration::minutes(15));
    let a = h.seed_tier(10, 0, price_40()).await;
    let b = h.seed_tier(10, 0, price_40()).await;

    let err = h
        .reservations
        .reserve(h.request(
            Uuid::new_v4(),
            vec![(a, 2), (b, 1)],
            PaymentMethod::Gateway,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExternalServiceError(_)));
    assert_eq!(h.sold(a).await, 0);
    assert_eq!(h.sold(b).await, 0);
}

#[tokio::test]
async fn gateway_callback_confirms_holding_booking() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Gateway))
        .await
        .unwrap();
    let order_ref = booking.gateway_order_ref.clone().unwrap();

    let confirmed = h
        .payments
        .confirm_gateway_callback(&callback_for(&order_ref))
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(h.sold(tier).await, 2);
}

#[tokio::test]
async fn tampered_callback_is_rejected_without_mutation() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Gateway))
        .await
        .unwrap();
    let order_ref = booking.gateway_order_ref.clone().unwrap();

    let mut callback = callback_for(&order_ref);
    callback.payment_ref = "pay_other".to_string();

    let err = h
        .payments
        .confirm_gateway_callback(&callback)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentVerification(_)));

    let current = h.store.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Holding);
    assert_eq!(h.sold(tier).await, 2);
}

// Idempotence: a duplicate callback on an already-confirmed booking is a
// no-op success, not an error, and the ledger does not move.
#[tokio::test]
async fn duplicate_confirmation_is_a_noop() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Gateway))
        .await
        .unwrap();
    let order_ref = booking.gateway_order_ref.clone().unwrap();
    let callback = callback_for(&order_ref);

    let first = h.payments.confirm_gateway_callback(&callback).await.unwrap();
    let second = h.payments.confirm_gateway_callback(&callback).await.unwrap();
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert_eq!(second.status, BookingStatus::Confirmed);
    assert_eq!(second.id, first.id);
    assert_eq!(h.sold(tier).await, 2);
}

// Explicit payment failure releases the held capacity; replaying the signal
// is a no-op.
#[tokio::test]
async fn payment_failure_releases_capacity() {
    let h = harness();
    let tier = h.seed_tier(10, 8, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Gateway))
        .await
        .unwrap();
    assert_eq!(h.sold(tier).await, 10);
    let order_ref = booking.gateway_order_ref.clone().unwrap();

    let failed = h.payments.mark_payment_failed(&order_ref).await.unwrap();
    assert_eq!(failed.status, BookingStatus::Failed);
    assert_eq!(h.sold(tier).await, 8);

    let replay = h.payments.mark_payment_failed(&order_ref).await.unwrap();
    assert_eq!(replay.status, BookingStatus::Failed);
    assert_eq!(h.sold(tier).await, 8);
}

// Scenario C: balance 50 cannot cover a total of 80; the booking stays
// holding and nothing moves.
#[tokio::test]
async fn balance_debit_failure_keeps_booking_holding() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;
    let user = Uuid::new_v4();
    h.wallet.insert_balance(user, Decimal::new(5000, 2)).await;

    let booking = h
        .reservations
        .reserve(h.request(user, vec![(tier, 2)], PaymentMethod::Balance))
        .await
        .unwrap();
    assert_eq!(booking.total_amount, Decimal::new(8000, 2));

    let err = h
        .payments
        .confirm_with_balance(booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds(_)));

    let current = h.store.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Holding);
    assert_eq!(h.sold(tier).await, 2);
    assert_eq!(h.wallet.balance(user).await, Some(Decimal::new(5000, 2)));
}

#[tokio::test]
async fn balance_debit_success_confirms_booking() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;
    let user = Uuid::new_v4();
    h.wallet.insert_balance(user, Decimal::new(10000, 2)).await;

    let booking = h
        .reservations
        .reserve(h.request(user, vec![(tier, 2)], PaymentMethod::Balance))
        .await
        .unwrap();

    let confirmed = h.payments.confirm_with_balance(booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(h.wallet.balance(user).await, Some(Decimal::new(2000, 2)));
    assert_eq!(h.sold(tier).await, 2);
}

// Scenario B: a lapsed hold on a full tier is swept, releasing its tickets.
#[tokio::test]
async fn sweep_releases_lapsed_holds() {
    let h = harness_with_lapsed_holds();
    let tier = h.seed_tier(10, 8, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Balance))
        .await
        .unwrap();
    assert_eq!(h.sold(tier).await, 10);

    let stats = h.sweeper.sweep_once().await;
    assert_eq!(stats.released, 1);
    assert_eq!(stats.failed, 0);

    let current = h.store.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Expired);
    assert_eq!(h.sold(tier).await, 8);
}

#[tokio::test]
async fn sweep_ignores_live_holds_and_confirmed_bookings() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;
    let user = Uuid::new_v4();
    h.wallet.insert_balance(user, Decimal::new(10000, 2)).await;

    let holding = h
        .reservations
        .reserve(h.request(user, vec![(tier, 1)], PaymentMethod::Balance))
        .await
        .unwrap();
    let confirmed = h
        .reservations
        .reserve(h.request(user, vec![(tier, 1)], PaymentMethod::Balance))
        .await
        .unwrap();
    h.payments.confirm_with_balance(confirmed.id).await.unwrap();

    let stats = h.sweeper.sweep_once().await;
    assert_eq!(stats, Default::default());

    let holding = h.store.booking(holding.id).await.unwrap().unwrap();
    assert_eq!(holding.status, BookingStatus::Holding);
    assert_eq!(h.sold(tier).await, 2);
}

// Race: a confirmation and a sweep contend for the same lapsed hold. Exactly
// one of confirmed/expired wins, and the tier matches the winner.
#[tokio::test]
async fn confirm_and_sweep_race_resolves_to_one_winner() {
    let h = harness_with_lapsed_holds();
    let tier = h.seed_tier(10, 8, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Gateway))
        .await
        .unwrap();
    let callback = callback_for(&booking.gateway_order_ref.clone().unwrap());

    let payments = h.payments.clone();
    let sweeper = h.sweeper.clone();
    let confirm = tokio::spawn(async move { payments.confirm_gateway_callback(&callback).await });
    let sweep = tokio::spawn(async move { sweeper.sweep_once().await });

    confirm.await.unwrap().unwrap();
    sweep.await.unwrap();

    let current = h.store.booking(booking.id).await.unwrap().unwrap();
    match current.status {
        BookingStatus::Confirmed => assert_eq!(h.sold(tier).await, 10),
        BookingStatus::Expired => assert_eq!(h.sold(tier).await, 8),
        other => panic!("unexpected terminal status {other:?}"),
    }
}

// Scenario D: cancelling a confirmed booking reverses the ledger and credits
// the refund.
#[tokio::test]
async fn cancelling_confirmed_booking_refunds_balance() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;
    let user = Uuid::new_v4();
    h.wallet.insert_balance(user, Decimal::new(8000, 2)).await;

    let booking = h
        .reservations
        .reserve(h.request(user, vec![(tier, 2)], PaymentMethod::Balance))
        .await
        .unwrap();
    h.payments.confirm_with_balance(booking.id).await.unwrap();
    assert_eq!(h.wallet.balance(user).await, Some(Decimal::ZERO));

    let cancelled = h.cancellations.cancel(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(h.sold(tier).await, 0);
    assert_eq!(h.wallet.balance(user).await, Some(Decimal::new(8000, 2)));
}

// A holding booking was never charged, so cancelling it releases capacity
// without crediting anything.
#[tokio::test]
async fn cancelling_holding_booking_does_not_refund() {
    let h = harness();
    let tier = h.seed_tier(10, 0, price_40()).await;
    let user = Uuid::new_v4();
    h.wallet.insert_balance(user, Decimal::new(1000, 2)).await;

    let booking = h
        .reservations
        .reserve(h.request(user, vec![(tier, 2)], PaymentMethod::Balance))
        .await
        .unwrap();

    let cancelled = h.cancellations.cancel(booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(h.sold(tier).await, 0);
    assert_eq!(h.wallet.balance(user).await, Some(Decimal::new(1000, 2)));
}

#[tokio::test]
async fn terminal_bookings_cannot_be_cancelled() {
    let h = harness_with_lapsed_holds();
    let tier = h.seed_tier(10, 0, price_40()).await;

    let booking = h
        .reservations
        .reserve(h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Balance))
        .await
        .unwrap();
    h.sweeper.sweep_once().await;

    let err = h.cancellations.cancel(booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let current = h.store.booking(booking.id).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Expired);
    assert_eq!(h.sold(tier).await, 0);
}

// Concurrent reservations on the last seats: their combined quantity exceeds
// capacity, so exactly one commits.
#[tokio::test]
async fn concurrent_reservations_cannot_oversell() {
    let h = harness();
    let tier = h.seed_tier(10, 8, price_40()).await;

    let r1 = h.reservations.clone();
    let r2 = h.reservations.clone();
    let req1 = h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Balance);
    let req2 = h.request(Uuid::new_v4(), vec![(tier, 2)], PaymentMethod::Balance);

    let a = tokio::spawn(async move { r1.reserve(req1).await });
    let b = tokio::spawn(async move { r2.reserve(req2).await });
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1, "exactly one wins");
    assert_eq!(h.sold(tier).await, 10);
}
