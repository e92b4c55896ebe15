use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled, capacity-limited instance of a tour product.
///
/// The booked count is not stored here: the slot ledger owns it, and the
/// availability endpoint reads it from there. This row only carries the
/// capacity limit the ledger is registered with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Departure {
    pub id: Uuid,
    pub product_id: Uuid,
    pub date: NaiveDate,
    pub max_slots: u32,
}

impl Departure {
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.date < today
    }
}
