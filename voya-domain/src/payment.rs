use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Pending,
    Paid,
    Failed,
}

/// Ledger row correlating a transaction reference with the last-seen
/// gateway outcome. Created when a signed request is issued, updated
/// (never re-created) when a return callback is verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub txn_ref: String,
    pub booking_id: Uuid,
    pub outcome: PaymentOutcome,
    pub response_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn issued(txn_ref: String, booking_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            txn_ref,
            booking_id,
            outcome: PaymentOutcome::Pending,
            response_code: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One return callback as received, kept for audit and security review.
/// Written for every return attempt, including ones that fail signature
/// verification (where `txn_ref` may be absent or forged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAudit {
    pub id: Uuid,
    pub txn_ref: Option<String>,
    pub verified: bool,
    pub response_code: Option<String>,
    pub raw_params: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
}
