use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, BookingTicket};
use crate::services::{
    CancellationService, GatewayCallback, PaymentService, ReservationRequest, ReservationService,
};
use crate::store::Store;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Clone)]
pub struct AppState {
    pub reservations: ReservationService,
    pub payments: PaymentService,
    pub cancellations: CancellationService,
    pub store: Arc<dyn Store>,
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
pub struct BookingPayload {
    #[serde(flatten)]
    booking: Booking,
    tickets: Vec<BookingTicket>,
}

#[derive(Deserialize)]
pub struct PaymentFailedRequest {
    pub order_ref: String,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "boxoffice-api",
    };

    success(payload, "Health check successful").into_response()
}

pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<ReservationRequest>,
) -> Result<Response, AppError> {
    let booking = state.reservations.reserve(request).await?;
    let payload = with_tickets(&state, booking).await?;
    Ok(created(payload, "Tickets held pending payment").into_response())
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = state
        .store
        .booking(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {id} was not found")))?;
    let payload = with_tickets(&state, booking).await?;
    Ok(success(payload, "Booking retrieved").into_response())
}

pub async fn pay_with_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = state.payments.confirm_with_balance(id).await?;
    Ok(success(booking, "Booking confirmed").into_response())
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = state.cancellations.cancel(id).await?;
    Ok(success(booking, "Booking cancelled").into_response())
}

pub async fn gateway_callback(
    State(state): State<AppState>,
    Json(callback): Json<GatewayCallback>,
) -> Result<Response, AppError> {
    let booking = state.payments.confirm_gateway_callback(&callback).await?;
    Ok(success(booking, "Payment confirmed").into_response())
}

pub async fn gateway_payment_failed(
    State(state): State<AppState>,
    Json(request): Json<PaymentFailedRequest>,
) -> Result<Response, AppError> {
    let booking = state.payments.mark_payment_failed(&request.order_ref).await?;
    Ok(success(booking, "Payment failure recorded").into_response())
}

async fn with_tickets(state: &AppState, booking: Booking) -> Result<BookingPayload, AppError> {
    let tickets = state.store.booking_tickets(booking.id).await?;
    Ok(BookingPayload { booking, tickets })
}
