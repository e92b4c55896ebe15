use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One customer's reservation against one departure. `quantity` is the
/// number of slots the booking claims while it is CONFIRMED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub departure_id: Uuid,
    pub quantity: u32,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "PENDING"),
            BookingStatus::Confirmed => write!(f, "CONFIRMED"),
            BookingStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Creation request as it arrives from the cart or admin layer.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub departure_id: Uuid,
    pub quantity: u32,
    pub total_price: Decimal,
    pub payment_method: String,
    #[serde(default = "default_initial_status")]
    pub initial_status: BookingStatus,
}

fn default_initial_status() -> BookingStatus {
    BookingStatus::Pending
}

impl Booking {
    pub fn from_request(req: &NewBooking) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            departure_id: req.departure_id,
            quantity: req.quantity,
            total_price: req.total_price,
            status: req.initial_status,
            payment_method: req.payment_method.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}
