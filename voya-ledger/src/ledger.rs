use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Departure not registered in ledger: {0}")]
    UnknownDeparture(Uuid),

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Insufficient capacity: requested {requested}, remaining {remaining}")]
    InsufficientCapacity { requested: u32, remaining: u32 },

    #[error("Ledger contention: update retries exhausted for departure {0}")]
    Contention(Uuid),
}

/// Atomic capacity accounting per departure.
///
/// `reserve` and `release` are linearizable with respect to each other for
/// a single departure: the count never exceeds `max_slots` nor drops below
/// zero under any interleaving of concurrent callers. `remaining` is a
/// display snapshot only; treating it as a reservation is the classic
/// check-then-act race that `reserve` exists to prevent.
#[async_trait]
pub trait SlotLedger: Send + Sync {
    /// Make a departure known to the ledger. Called once by catalog
    /// management; re-registering an existing departure is a no-op.
    async fn register(
        &self,
        departure_id: Uuid,
        max_slots: u32,
        booked_slots: u32,
    ) -> Result<(), LedgerError>;

    /// Atomically claim `quantity` slots, or fail without changing state.
    async fn reserve(&self, departure_id: Uuid, quantity: u32) -> Result<(), LedgerError>;

    /// Atomically give back `quantity` slots, clamped at zero. Releasing
    /// more than is held is a caller bug and is logged, not corrupting.
    async fn release(&self, departure_id: Uuid, quantity: u32) -> Result<(), LedgerError>;

    /// Read-only snapshot of free slots.
    async fn remaining(&self, departure_id: Uuid) -> Result<u32, LedgerError>;
}

struct SlotCell {
    max_slots: u32,
    booked: AtomicU32,
}

/// Lock-free ledger over per-departure atomic counters.
///
/// Each mutation is a bounded optimistic compare-exchange loop; the check
/// and the increment are one CAS, so two customers racing for the last
/// seat serialize on the hardware primitive. The same contract maps onto a
/// SQL `UPDATE ... WHERE booked_slots + $q <= max_slots` for a persistent
/// implementation.
pub struct InMemorySlotLedger {
    cells: DashMap<Uuid, Arc<SlotCell>>,
    max_retries: u32,
}

impl InMemorySlotLedger {
    pub fn new(max_retries: u32) -> Self {
        Self {
            cells: DashMap::new(),
            max_retries: max_retries.max(1),
        }
    }

    fn cell(&self, departure_id: Uuid) -> Result<Arc<SlotCell>, LedgerError> {
        self.cells
            .get(&departure_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::UnknownDeparture(departure_id))
    }
}

impl Default for InMemorySlotLedger {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl SlotLedger for InMemorySlotLedger {
    async fn register(
        &self,
        departure_id: Uuid,
        max_slots: u32,
        booked_slots: u32,
    ) -> Result<(), LedgerError> {
        self.cells.entry(departure_id).or_insert_with(|| {
            Arc::new(SlotCell {
                max_slots,
                booked: AtomicU32::new(booked_slots.min(max_slots)),
            })
        });
        Ok(())
    }

    async fn reserve(&self, departure_id: Uuid, quantity: u32) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        let cell = self.cell(departure_id)?;

        let mut current = cell.booked.load(Ordering::Acquire);
        for _ in 0..self.max_retries {
            let next = current
                .checked_add(quantity)
                .filter(|next| *next <= cell.max_slots)
                .ok_or(LedgerError::InsufficientCapacity {
                    requested: quantity,
                    remaining: cell.max_slots - current,
                })?;

            match cell
                .booked
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(observed) => {
                    current = observed;
                    std::hint::spin_loop();
                }
            }
        }
        Err(LedgerError::Contention(departure_id))
    }

    async fn release(&self, departure_id: Uuid, quantity: u32) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity);
        }
        let cell = self.cell(departure_id)?;

        let mut current = cell.booked.load(Ordering::Acquire);
        for _ in 0..self.max_retries {
            if quantity > current {
                warn!(
                    %departure_id,
                    quantity,
                    held = current,
                    "release exceeds held slots, clamping at zero"
                );
            }
            let next = current.saturating_sub(quantity);

            match cell
                .booked
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(observed) => {
                    current = observed;
                    std::hint::spin_loop();
                }
            }
        }
        Err(LedgerError::Contention(departure_id))
    }

    async fn remaining(&self, departure_id: Uuid) -> Result<u32, LedgerError> {
        let cell = self.cell(departure_id)?;
        Ok(cell.max_slots - cell.booked.load(Ordering::Acquire))
    }
}
