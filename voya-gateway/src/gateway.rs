use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use voya_booking::{BookingError, BookingManager};
use voya_domain::{
    Booking, BookingStatus, CallbackAudit, PaymentAuditRepository, PaymentOutcome, PaymentRecord,
    RepositoryError,
};

use crate::signature::{self, SignatureError, SECURE_HASH_FIELD};

// Fixed wire protocol of the payment partner.
const F_VERSION: &str = "vnp_Version";
const F_COMMAND: &str = "vnp_Command";
const F_MERCHANT: &str = "vnp_TmnCode";
const F_AMOUNT: &str = "vnp_Amount";
const F_CURRENCY: &str = "vnp_CurrCode";
const F_TXN_REF: &str = "vnp_TxnRef";
const F_ORDER_INFO: &str = "vnp_OrderInfo";
const F_ORDER_TYPE: &str = "vnp_OrderType";
const F_LOCALE: &str = "vnp_Locale";
const F_RETURN_URL: &str = "vnp_ReturnUrl";
const F_CLIENT_IP: &str = "vnp_IpAddr";
const F_CREATE_DATE: &str = "vnp_CreateDate";
const F_BANK_CODE: &str = "vnp_BankCode";
const F_RESPONSE_CODE: &str = "vnp_ResponseCode";

const PROTOCOL_VERSION: &str = "2.1.0";
const COMMAND_PAY: &str = "pay";
const CREATE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// The partner's designated success code; everything else is a failure.
pub const RESPONSE_SUCCESS: &str = "00";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub pay_url: String,
    pub merchant_code: String,
    pub secret: String,
    pub return_url: String,
    pub currency: String,
    pub locale: String,
    pub order_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnOutcome {
    Paid,
    Failed,
    InvalidSignature,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Price {0} has sub-minor-unit precision; refusing to truncate silently")]
    AmountPrecision(Decimal),

    #[error("Price {0} is outside the representable amount range")]
    AmountRange(Decimal),

    #[error("Verified return is missing the transaction reference")]
    MissingReference,

    #[error("Verified return references unknown transaction {0}")]
    UnknownReference(String),

    #[error("Transaction reference {0} is not a booking id")]
    BadReference(String),

    #[error(
        "Payment for booking {booking_id} succeeded but the departure sold out \
         (requested {requested}, remaining {remaining}); manual reconciliation required"
    )]
    PaidButSoldOut {
        booking_id: Uuid,
        requested: u32,
        remaining: u32,
    },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Booking(BookingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The only component that talks to the signature codec in the context of
/// a payment round trip. Builds outbound signed redirect requests and
/// translates verified return callbacks into booking transitions; an
/// unverified callback never reaches the booking manager.
pub struct ReconciliationGateway {
    config: GatewayConfig,
    bookings: Arc<BookingManager>,
    audit: Arc<dyn PaymentAuditRepository>,
}

impl ReconciliationGateway {
    pub fn new(
        config: GatewayConfig,
        bookings: Arc<BookingManager>,
        audit: Arc<dyn PaymentAuditRepository>,
    ) -> Self {
        Self {
            config,
            bookings,
            audit,
        }
    }

    /// Assemble the partner's fixed parameter set for a booking and return
    /// the signed redirect URL. Also opens the payment record for the
    /// transaction reference (the booking id); re-issuing a URL for the
    /// same booking updates that record rather than minting a second one.
    pub async fn build_payment_request(
        &self,
        booking: &Booking,
        client_ip: &str,
        bank_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, GatewayError> {
        let amount = minor_units(booking.total_price)?;
        let txn_ref = booking.id.to_string();

        let mut params = BTreeMap::new();
        params.insert(F_VERSION.to_string(), PROTOCOL_VERSION.to_string());
        params.insert(F_COMMAND.to_string(), COMMAND_PAY.to_string());
        params.insert(F_MERCHANT.to_string(), self.config.merchant_code.clone());
        params.insert(F_AMOUNT.to_string(), amount.to_string());
        params.insert(F_CURRENCY.to_string(), self.config.currency.clone());
        params.insert(F_TXN_REF.to_string(), txn_ref.clone());
        params.insert(
            F_ORDER_INFO.to_string(),
            format!("Tour booking {}", booking.id),
        );
        params.insert(F_ORDER_TYPE.to_string(), self.config.order_type.clone());
        params.insert(F_LOCALE.to_string(), self.config.locale.clone());
        params.insert(F_RETURN_URL.to_string(), self.config.return_url.clone());
        params.insert(F_CLIENT_IP.to_string(), client_ip.to_string());
        params.insert(
            F_CREATE_DATE.to_string(),
            now.format(CREATE_DATE_FORMAT).to_string(),
        );
        if let Some(bank) = bank_code {
            params.insert(F_BANK_CODE.to_string(), bank.to_string());
        }

        self.audit
            .upsert_record(PaymentRecord::issued(txn_ref.clone(), booking.id))
            .await?;

        let url =
            signature::build_redirect_url(&self.config.pay_url, &params, self.config.secret.as_bytes())?;
        info!(booking_id = %booking.id, %txn_ref, "payment redirect issued");
        Ok(url)
    }

    /// Verify and reconcile an inbound return callback.
    ///
    /// Every attempt is written to the audit trail, forged ones included.
    /// Only a verified signature may drive booking transitions, and a
    /// duplicate delivery is absorbed by the manager's idempotency.
    pub async fn handle_return(
        &self,
        raw: &BTreeMap<String, String>,
    ) -> Result<ReturnOutcome, GatewayError> {
        let candidate = raw.get(SECURE_HASH_FIELD).cloned();
        let txn_ref = raw.get(F_TXN_REF).cloned();
        let response_code = raw.get(F_RESPONSE_CODE).cloned();

        let verified = match &candidate {
            Some(digest) => {
                signature::verify(self.config.secret.as_bytes(), raw, digest)?
            }
            None => false,
        };

        self.audit
            .append_callback(CallbackAudit {
                id: Uuid::new_v4(),
                txn_ref: txn_ref.clone(),
                verified,
                response_code: response_code.clone(),
                raw_params: raw.clone(),
                received_at: Utc::now(),
            })
            .await?;

        if !verified {
            warn!(params = ?raw, "payment return failed signature verification");
            return Ok(ReturnOutcome::InvalidSignature);
        }

        let txn_ref = txn_ref.ok_or(GatewayError::MissingReference)?;
        let booking_id = Uuid::parse_str(&txn_ref)
            .map_err(|_| GatewayError::BadReference(txn_ref.clone()))?;

        // A verified return without an issued record can happen if the
        // redirect was built before a crash; reopen the record so the
        // outcome still lands somewhere queryable.
        if self.audit.get_record(&txn_ref).await?.is_none() {
            self.audit
                .upsert_record(PaymentRecord::issued(txn_ref.clone(), booking_id))
                .await?;
        }

        let code = response_code.unwrap_or_default();
        if code == RESPONSE_SUCCESS {
            self.settle_paid(&txn_ref, booking_id, &code).await
        } else {
            self.settle_failed(&txn_ref, booking_id, &code).await
        }
    }

    async fn settle_paid(
        &self,
        txn_ref: &str,
        booking_id: Uuid,
        code: &str,
    ) -> Result<ReturnOutcome, GatewayError> {
        // The money moved regardless of what happens to the booking.
        self.audit
            .set_outcome(txn_ref, PaymentOutcome::Paid, Some(code.to_string()))
            .await?;

        match self
            .bookings
            .change_status(booking_id, BookingStatus::Confirmed)
            .await
        {
            Ok(_) => {
                info!(%booking_id, "payment confirmed");
                Ok(ReturnOutcome::Paid)
            }
            Err(BookingError::SoldOut {
                requested,
                remaining,
            }) => {
                error!(
                    %booking_id,
                    requested,
                    remaining,
                    "payment succeeded but capacity is exhausted; escalating"
                );
                Err(GatewayError::PaidButSoldOut {
                    booking_id,
                    requested,
                    remaining,
                })
            }
            Err(BookingError::BookingNotFound(_)) => {
                Err(GatewayError::UnknownReference(txn_ref.to_string()))
            }
            Err(other) => Err(GatewayError::Booking(other)),
        }
    }

    /// Cancel PENDING bookings older than `max_age` whose payment was
    /// never reported as received. A booking whose record says the money
    /// arrived (the paid-but-sold-out escalation) is awaiting manual
    /// reconciliation and is left alone. Returns how many were cancelled.
    pub async fn sweep_stale_pending(&self, max_age: Duration) -> Result<usize, GatewayError> {
        let stale = self
            .bookings
            .list_stale_pending(max_age)
            .await
            .map_err(GatewayError::Booking)?;

        let mut cancelled = 0;
        for booking in stale {
            let record = self.audit.get_record(&booking.id.to_string()).await?;
            if matches!(record, Some(r) if r.outcome == PaymentOutcome::Paid) {
                warn!(
                    booking_id = %booking.id,
                    "stale sweep skipped paid booking awaiting reconciliation"
                );
                continue;
            }
            match self
                .bookings
                .change_status(booking.id, BookingStatus::Cancelled)
                .await
            {
                Ok(_) => cancelled += 1,
                Err(err) => {
                    warn!(booking_id = %booking.id, %err, "stale sweep skipped booking");
                }
            }
        }
        if cancelled > 0 {
            info!(cancelled, "stale pending bookings cancelled");
        }
        Ok(cancelled)
    }

    async fn settle_failed(
        &self,
        txn_ref: &str,
        booking_id: Uuid,
        code: &str,
    ) -> Result<ReturnOutcome, GatewayError> {
        self.audit
            .set_outcome(txn_ref, PaymentOutcome::Failed, Some(code.to_string()))
            .await?;

        match self.bookings.get_booking(booking_id).await {
            Ok(booking) if booking.status == BookingStatus::Pending => {
                self.bookings
                    .change_status(booking_id, BookingStatus::Cancelled)
                    .await
                    .map_err(GatewayError::Booking)?;
            }
            Ok(booking) => {
                // Already terminal (or confirmed by an earlier return);
                // a late failure report does not un-confirm anything.
                info!(%booking_id, status = %booking.status, "failed return on settled booking, no-op");
            }
            Err(BookingError::BookingNotFound(_)) => {
                return Err(GatewayError::UnknownReference(txn_ref.to_string()));
            }
            Err(other) => return Err(GatewayError::Booking(other)),
        }
        Ok(ReturnOutcome::Failed)
    }
}

/// Exact conversion to minor units: multiply by 100 in decimal
/// arithmetic. Prices with sub-minor-unit precision are rejected rather
/// than truncated by floating-point accident.
fn minor_units(price: Decimal) -> Result<i64, GatewayError> {
    let scaled = price * Decimal::from(100u32);
    if !scaled.fract().is_zero() {
        return Err(GatewayError::AmountPrecision(price));
    }
    scaled.to_i64().ok_or(GatewayError::AmountRange(price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use voya_domain::{
        BookingRepository, Departure, DepartureRepository, NewBooking, PaymentAuditRepository,
    };
    use voya_ledger::{InMemorySlotLedger, SlotLedger};
    use voya_store::{InMemoryBookingStore, InMemoryDepartureStore, InMemoryPaymentAuditStore};

    const SECRET: &str = "test-gateway-secret";

    struct Harness {
        gateway: ReconciliationGateway,
        manager: Arc<BookingManager>,
        ledger: Arc<InMemorySlotLedger>,
        audit: Arc<InMemoryPaymentAuditStore>,
        departure_id: Uuid,
    }

    async fn harness(max_slots: u32) -> Harness {
        let bookings: Arc<dyn BookingRepository> = Arc::new(InMemoryBookingStore::new());
        let departures = Arc::new(InMemoryDepartureStore::new());
        let ledger = Arc::new(InMemorySlotLedger::default());
        let audit = Arc::new(InMemoryPaymentAuditStore::new());

        let departure_id = Uuid::new_v4();
        departures
            .insert(Departure {
                id: departure_id,
                product_id: Uuid::new_v4(),
                date: Utc::now().date_naive() + Duration::days(14),
                max_slots,
            })
            .await
            .unwrap();
        ledger.register(departure_id, max_slots, 0).await.unwrap();

        let manager = Arc::new(BookingManager::new(
            bookings,
            departures.clone(),
            ledger.clone(),
        ));
        let gateway = ReconciliationGateway::new(
            GatewayConfig {
                pay_url: "https://pay.example/checkout".to_string(),
                merchant_code: "VOYATEST".to_string(),
                secret: SECRET.to_string(),
                return_url: "https://shop.example/return".to_string(),
                currency: "VND".to_string(),
                locale: "vn".to_string(),
                order_type: "travel".to_string(),
            },
            manager.clone(),
            audit.clone(),
        );

        Harness {
            gateway,
            manager,
            ledger,
            audit,
            departure_id,
        }
    }

    async fn pending_booking(h: &Harness, quantity: u32) -> Booking {
        h.manager
            .create_booking(NewBooking {
                user_id: Uuid::new_v4(),
                departure_id: h.departure_id,
                quantity,
                total_price: Decimal::new(250_00, 2),
                payment_method: "gateway".to_string(),
                initial_status: BookingStatus::Pending,
            })
            .await
            .unwrap()
    }

    /// Builds the return parameter set the partner would send, signed
    /// with the shared secret.
    fn provider_return(booking: &Booking, response_code: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(F_TXN_REF.to_string(), booking.id.to_string());
        params.insert(F_AMOUNT.to_string(), "25000".to_string());
        params.insert(F_RESPONSE_CODE.to_string(), response_code.to_string());
        params.insert("vnp_BankTranNo".to_string(), "NCB20240101".to_string());

        let digest = signature::sign(SECRET.as_bytes(), &params).unwrap();
        params.insert(SECURE_HASH_FIELD.to_string(), digest);
        params
    }

    #[tokio::test]
    async fn test_paid_return_confirms_and_reserves() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 2).await;
        h.gateway
            .build_payment_request(&booking, "203.0.113.7", None, Utc::now())
            .await
            .unwrap();

        let outcome = h
            .gateway
            .handle_return(&provider_return(&booking, RESPONSE_SUCCESS))
            .await
            .unwrap();

        assert_eq!(outcome, ReturnOutcome::Paid);
        assert_eq!(
            h.manager.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Confirmed
        );
        assert_eq!(h.ledger.remaining(h.departure_id).await.unwrap(), 3);

        let record = h
            .audit
            .get_record(&booking.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.outcome, PaymentOutcome::Paid);
        assert_eq!(record.response_code.as_deref(), Some(RESPONSE_SUCCESS));
    }

    #[tokio::test]
    async fn test_duplicate_paid_return_reserves_once() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 2).await;
        let params = provider_return(&booking, RESPONSE_SUCCESS);

        assert_eq!(
            h.gateway.handle_return(&params).await.unwrap(),
            ReturnOutcome::Paid
        );
        assert_eq!(
            h.gateway.handle_return(&params).await.unwrap(),
            ReturnOutcome::Paid
        );
        assert_eq!(h.ledger.remaining(h.departure_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_forged_digest_is_a_no_op() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 2).await;

        let mut params = provider_return(&booking, RESPONSE_SUCCESS);
        params.insert(F_AMOUNT.to_string(), "1".to_string()); // tamper after signing

        let outcome = h.gateway.handle_return(&params).await.unwrap();
        assert_eq!(outcome, ReturnOutcome::InvalidSignature);

        // State untouched, attempt audited for security review.
        assert_eq!(
            h.manager.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Pending
        );
        assert_eq!(h.ledger.remaining(h.departure_id).await.unwrap(), 5);
        let trail = h.audit.list_callbacks(&booking.id.to_string()).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert!(!trail[0].verified);
    }

    #[tokio::test]
    async fn test_missing_digest_is_invalid_signature() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 1).await;

        let mut params = provider_return(&booking, RESPONSE_SUCCESS);
        params.remove(SECURE_HASH_FIELD);

        assert_eq!(
            h.gateway.handle_return(&params).await.unwrap(),
            ReturnOutcome::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_failed_return_cancels_pending_booking() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 2).await;

        let outcome = h
            .gateway
            .handle_return(&provider_return(&booking, "24"))
            .await
            .unwrap();

        assert_eq!(outcome, ReturnOutcome::Failed);
        assert_eq!(
            h.manager.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_late_failure_does_not_unconfirm() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 2).await;

        h.gateway
            .handle_return(&provider_return(&booking, RESPONSE_SUCCESS))
            .await
            .unwrap();
        let outcome = h
            .gateway
            .handle_return(&provider_return(&booking, "24"))
            .await
            .unwrap();

        assert_eq!(outcome, ReturnOutcome::Failed);
        assert_eq!(
            h.manager.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Confirmed
        );
        assert_eq!(h.ledger.remaining(h.departure_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_paid_but_sold_out_escalates() {
        let h = harness(2).await;
        let booking = pending_booking(&h, 2).await;

        // Another sale takes the remaining capacity while payment is out.
        h.ledger.reserve(h.departure_id, 2).await.unwrap();

        let err = h
            .gateway
            .handle_return(&provider_return(&booking, RESPONSE_SUCCESS))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::PaidButSoldOut { .. }));
        // The booking stays pending; the money is recorded as received.
        assert_eq!(
            h.manager.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Pending
        );
        let record = h
            .audit
            .get_record(&booking.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.outcome, PaymentOutcome::Paid);
    }

    #[tokio::test]
    async fn test_unknown_reference_on_verified_return() {
        let h = harness(5).await;

        let mut params = BTreeMap::new();
        params.insert(F_TXN_REF.to_string(), Uuid::new_v4().to_string());
        params.insert(F_RESPONSE_CODE.to_string(), RESPONSE_SUCCESS.to_string());
        let digest = signature::sign(SECRET.as_bytes(), &params).unwrap();
        params.insert(SECURE_HASH_FIELD.to_string(), digest);

        let err = h.gateway.handle_return(&params).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownReference(_)));
    }

    #[tokio::test]
    async fn test_redirect_contains_fixed_field_set() {
        let h = harness(5).await;
        let booking = pending_booking(&h, 2).await;

        let url = h
            .gateway
            .build_payment_request(&booking, "203.0.113.7", Some("NCB"), Utc::now())
            .await
            .unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: BTreeMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(pairs.get(F_VERSION).map(String::as_str), Some("2.1.0"));
        assert_eq!(pairs.get(F_COMMAND).map(String::as_str), Some("pay"));
        assert_eq!(pairs.get(F_AMOUNT).map(String::as_str), Some("25000"));
        assert_eq!(pairs.get(F_TXN_REF), Some(&booking.id.to_string()));
        assert_eq!(pairs.get(F_BANK_CODE).map(String::as_str), Some("NCB"));
        assert_eq!(pairs.get(F_CREATE_DATE).map(|v| v.len()), Some(14));
        assert!(pairs.contains_key(SECURE_HASH_FIELD));

        // Record opened as pending at issue time.
        let record = h
            .audit
            .get_record(&booking.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.outcome, PaymentOutcome::Pending);
    }

    #[tokio::test]
    async fn test_sweep_cancels_unpaid_but_skips_paid_pending() {
        let h = harness(5).await;
        let unpaid = pending_booking(&h, 1).await;

        // Paid-but-unconfirmed: the money arrived, the booking is stuck
        // PENDING and waits for a human, not the sweeper.
        let paid = pending_booking(&h, 2).await;
        h.audit
            .upsert_record(PaymentRecord::issued(paid.id.to_string(), paid.id))
            .await
            .unwrap();
        h.audit
            .set_outcome(
                &paid.id.to_string(),
                PaymentOutcome::Paid,
                Some(RESPONSE_SUCCESS.to_string()),
            )
            .await
            .unwrap();

        // Zero max age: everything pending right now is stale.
        let cancelled = h.gateway.sweep_stale_pending(Duration::zero()).await.unwrap();
        assert_eq!(cancelled, 1);

        assert_eq!(
            h.manager.get_booking(unpaid.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
        assert_eq!(
            h.manager.get_booking(paid.id).await.unwrap().status,
            BookingStatus::Pending
        );
    }

    #[test]
    fn test_minor_units_is_exact() {
        assert_eq!(minor_units(Decimal::new(250_00, 2)).unwrap(), 25000);
        assert_eq!(minor_units(Decimal::new(7, 0)).unwrap(), 700);
        assert!(matches!(
            minor_units(Decimal::new(10_123, 3)),
            Err(GatewayError::AmountPrecision(_))
        ));
    }
}
