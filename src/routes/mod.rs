use axum::{
    routing::{get, post},
    Router,
};

use crate::config::{apply_security_headers, create_cors_layer};
use crate::handlers::{
    cancel_booking, create_booking, gateway_callback, gateway_payment_failed, get_booking,
    health_check, pay_with_balance, AppState,
};

pub fn create_routes(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/pay/balance", post(pay_with_balance))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/payments/callback", post(gateway_callback))
        .route("/payments/failed", post(gateway_payment_failed))
        .with_state(state)
        .layer(create_cors_layer());

    apply_security_headers(router)
}
