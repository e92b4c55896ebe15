pub mod ledger;

pub use ledger::{InMemorySlotLedger, LedgerError, SlotLedger};
