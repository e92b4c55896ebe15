use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use voya_booking::BookingError;
use voya_gateway::GatewayError;
use voya_ledger::LedgerError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// Signature rejections deliberately carry no detail to the caller;
    /// the specifics are already logged server-side.
    SignatureRejected,
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::SignatureRejected => (
                StatusCode::BAD_REQUEST,
                "Payment verification failed".to_string(),
            ),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::InvalidQuantity
            | BookingError::InvalidPrice
            | BookingError::CancelledAtCreation
            | BookingError::PastDeparture { .. } => AppError::ValidationError(err.to_string()),
            BookingError::BookingNotFound(_) | BookingError::DepartureNotFound(_) => {
                AppError::NotFoundError(err.to_string())
            }
            BookingError::SoldOut { .. } | BookingError::InvalidTransition { .. } => {
                AppError::ConflictError(err.to_string())
            }
            BookingError::CompensationFailure { .. }
            | BookingError::Ledger(_)
            | BookingError::Repository(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AmountPrecision(_)
            | GatewayError::AmountRange(_)
            | GatewayError::MissingReference
            | GatewayError::BadReference(_) => AppError::ValidationError(err.to_string()),
            GatewayError::UnknownReference(_) => AppError::NotFoundError(err.to_string()),
            GatewayError::Booking(inner) => inner.into(),
            // Already escalated via error-level logs in the gateway.
            GatewayError::PaidButSoldOut { .. }
            | GatewayError::Signature(_)
            | GatewayError::Repository(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownDeparture(_) => AppError::NotFoundError(err.to_string()),
            LedgerError::InvalidQuantity => AppError::ValidationError(err.to_string()),
            LedgerError::InsufficientCapacity { .. } => AppError::ConflictError(err.to_string()),
            LedgerError::Contention(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
