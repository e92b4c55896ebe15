use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voya_domain::Departure;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateDeparturePayload {
    product_id: Uuid,
    date: NaiveDate,
    max_slots: u32,
}

#[derive(Debug, Serialize)]
struct AvailabilityResponse {
    departure_id: Uuid,
    remaining: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/departures", post(create_departure))
        .route("/v1/departures/{id}/availability", get(availability))
}

/// Narrow catalog-management interface: makes a departure bookable by
/// inserting the row and registering it with the slot ledger.
async fn create_departure(
    State(state): State<AppState>,
    Json(payload): Json<CreateDeparturePayload>,
) -> Result<Json<Departure>, AppError> {
    let departure = Departure {
        id: Uuid::new_v4(),
        product_id: payload.product_id,
        date: payload.date,
        max_slots: payload.max_slots,
    };

    state
        .departures
        .insert(departure.clone())
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    state
        .ledger
        .register(departure.id, departure.max_slots, 0)
        .await?;

    Ok(Json(departure))
}

/// Display snapshot only; a reservation still has to go through a
/// booking transition.
async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let remaining = state.ledger.remaining(id).await?;
    Ok(Json(AvailabilityResponse {
        departure_id: id,
        remaining,
    }))
}
