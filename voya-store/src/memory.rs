use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use voya_domain::{
    Booking, BookingRepository, BookingStatus, CallbackAudit, Departure, DepartureRepository,
    PaymentAuditRepository, PaymentOutcome, PaymentRecord, RepositoryError,
};

/// In-memory booking store. Production deployments swap this for a
/// SQL-backed implementation of the same trait; the state machine only
/// ever sees the trait object.
pub struct InMemoryBookingStore {
    rows: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingStore {
    async fn insert(&self, booking: Booking) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&booking.id) {
            return Err(RepositoryError::Duplicate(booking.id.to_string()));
        }
        rows.insert(booking.id, booking);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, RepositoryError> {
        let mut rows = self.rows.write().await;
        let booking = rows
            .get_mut(&id)
            .ok_or(RepositoryError::BookingNotFound(id))?;
        if booking.status != expected {
            return Ok(None);
        }
        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::BookingNotFound(id))
    }

    async fn list_pending_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at <= cutoff)
            .cloned()
            .collect())
    }
}

pub struct InMemoryDepartureStore {
    rows: RwLock<HashMap<Uuid, Departure>>,
}

impl InMemoryDepartureStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDepartureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DepartureRepository for InMemoryDepartureStore {
    async fn insert(&self, departure: Departure) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&departure.id) {
            return Err(RepositoryError::Duplicate(departure.id.to_string()));
        }
        rows.insert(departure.id, departure);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Departure>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }
}

/// Payment records keyed by transaction reference, plus the append-only
/// callback audit trail (kept even for failed-signature attempts).
pub struct InMemoryPaymentAuditStore {
    records: RwLock<HashMap<String, PaymentRecord>>,
    callbacks: RwLock<Vec<CallbackAudit>>,
}

impl InMemoryPaymentAuditStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryPaymentAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentAuditRepository for InMemoryPaymentAuditStore {
    async fn upsert_record(&self, record: PaymentRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.txn_ref) {
            Some(existing) => {
                existing.updated_at = Utc::now();
            }
            None => {
                records.insert(record.txn_ref.clone(), record);
            }
        }
        Ok(())
    }

    async fn get_record(&self, txn_ref: &str) -> Result<Option<PaymentRecord>, RepositoryError> {
        Ok(self.records.read().await.get(txn_ref).cloned())
    }

    async fn set_outcome(
        &self,
        txn_ref: &str,
        outcome: PaymentOutcome,
        response_code: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(txn_ref)
            .ok_or_else(|| RepositoryError::Storage(format!("no payment record {txn_ref}")))?;
        record.outcome = outcome;
        record.response_code = response_code;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn append_callback(&self, audit: CallbackAudit) -> Result<(), RepositoryError> {
        self.callbacks.write().await.push(audit);
        Ok(())
    }

    async fn list_callbacks(&self, txn_ref: &str) -> Result<Vec<CallbackAudit>, RepositoryError> {
        let callbacks = self.callbacks.read().await;
        Ok(callbacks
            .iter()
            .filter(|c| c.txn_ref.as_deref() == Some(txn_ref))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            departure_id: Uuid::new_v4(),
            quantity: 2,
            total_price: Decimal::new(99_50, 2),
            status,
            payment_method: "gateway".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_is_unique_per_id() {
        let store = InMemoryBookingStore::new();
        let row = booking(BookingStatus::Pending);

        store.insert(row.clone()).await.unwrap();
        let err = store.insert(row).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_update_status_if_applies_only_on_match() {
        let store = InMemoryBookingStore::new();
        let row = booking(BookingStatus::Pending);
        let created_at = row.created_at;
        store.insert(row.clone()).await.unwrap();

        let updated = store
            .update_status_if(row.id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Confirmed);
        assert!(updated.updated_at >= created_at);

        // Stale precondition: the row moved on, so nothing is written.
        let missed = store
            .update_status_if(row.id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert!(missed.is_none());
        let current = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(current.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_list_pending_before_filters_status_and_age() {
        let store = InMemoryBookingStore::new();

        let mut old_pending = booking(BookingStatus::Pending);
        old_pending.created_at = Utc::now() - chrono::Duration::hours(2);
        let confirmed = booking(BookingStatus::Confirmed);
        let fresh_pending = booking(BookingStatus::Pending);

        store.insert(old_pending.clone()).await.unwrap();
        store.insert(confirmed).await.unwrap();
        store.insert(fresh_pending).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let stale = store.list_pending_before(cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old_pending.id);
    }

    #[tokio::test]
    async fn test_payment_record_upsert_never_duplicates() {
        let store = InMemoryPaymentAuditStore::new();
        let booking_id = Uuid::new_v4();
        let record = PaymentRecord::issued(booking_id.to_string(), booking_id);

        store.upsert_record(record.clone()).await.unwrap();
        store.upsert_record(record).await.unwrap();

        let stored = store
            .get_record(&booking_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.outcome, PaymentOutcome::Pending);

        store
            .set_outcome(
                &booking_id.to_string(),
                PaymentOutcome::Paid,
                Some("00".to_string()),
            )
            .await
            .unwrap();
        let stored = store
            .get_record(&booking_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.outcome, PaymentOutcome::Paid);
        assert_eq!(stored.response_code.as_deref(), Some("00"));
    }
}
