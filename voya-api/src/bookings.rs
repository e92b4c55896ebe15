use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voya_domain::{Booking, BookingStatus, NewBooking};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateBookingPayload {
    user_id: Uuid,
    departure_id: Uuid,
    quantity: u32,
    total_price: Decimal,
    payment_method: String,
    /// Admin path: reserve capacity at creation and skip the payment
    /// redirect. Customer checkouts leave this false.
    #[serde(default)]
    confirm: bool,
    bank_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct BookingResponse {
    booking: Booking,
    pay_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeStatusPayload {
    status: BookingStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route(
            "/v1/bookings/{id}",
            get(get_booking).delete(delete_booking),
        )
        .route("/v1/bookings/{id}/status", axum::routing::patch(change_status))
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBookingPayload>,
) -> Result<Json<BookingResponse>, AppError> {
    let initial_status = if payload.confirm {
        BookingStatus::Confirmed
    } else {
        BookingStatus::Pending
    };

    let booking = state
        .bookings
        .create_booking(NewBooking {
            user_id: payload.user_id,
            departure_id: payload.departure_id,
            quantity: payload.quantity,
            total_price: payload.total_price,
            payment_method: payload.payment_method,
            initial_status,
        })
        .await?;

    // Only an unpaid booking needs the redirect.
    let pay_url = if booking.status == BookingStatus::Pending {
        Some(
            state
                .gateway
                .build_payment_request(
                    &booking,
                    &client_ip(&headers),
                    payload.bank_code.as_deref(),
                    Utc::now(),
                )
                .await?,
        )
    } else {
        None
    };

    Ok(Json(BookingResponse { booking, pay_url }))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(id).await?))
}

async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeStatusPayload>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.change_status(id, payload.status).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.bookings.delete_booking(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
