use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::departure::Departure;
use crate::payment::{CallbackAudit, PaymentOutcome, PaymentRecord};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Departure not found: {0}")]
    DepartureNotFound(Uuid),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: Booking) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError>;

    /// Conditionally set the status: applies only while the current
    /// status still equals `expected`, returning the updated row, or
    /// `None` when the precondition no longer holds. This is the
    /// concurrency gate for lifecycle transitions; a persistent
    /// implementation maps it onto
    /// `UPDATE ... SET status = $to WHERE id = $id AND status = $expected`.
    async fn update_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, RepositoryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Pending bookings created before `cutoff`, for the stale sweep.
    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError>;
}

#[async_trait]
pub trait DepartureRepository: Send + Sync {
    async fn insert(&self, departure: Departure) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Departure>, RepositoryError>;
}

#[async_trait]
pub trait PaymentAuditRepository: Send + Sync {
    /// Upsert the per-transaction record: created on issue, updated on
    /// verified return. Never produces a second row for the same ref.
    async fn upsert_record(&self, record: PaymentRecord) -> Result<(), RepositoryError>;

    async fn get_record(&self, txn_ref: &str) -> Result<Option<PaymentRecord>, RepositoryError>;

    async fn set_outcome(
        &self,
        txn_ref: &str,
        outcome: PaymentOutcome,
        response_code: Option<String>,
    ) -> Result<(), RepositoryError>;

    /// Append-only audit trail, one row per return attempt.
    async fn append_callback(&self, audit: CallbackAudit) -> Result<(), RepositoryError>;

    async fn list_callbacks(&self, txn_ref: &str) -> Result<Vec<CallbackAudit>, RepositoryError>;
}
