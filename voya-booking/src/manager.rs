use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use voya_domain::{
    Booking, BookingRepository, BookingStatus, DepartureRepository, NewBooking, RepositoryError,
};
use voya_ledger::{LedgerError, SlotLedger};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("Total price must not be negative")]
    InvalidPrice,

    #[error("A booking cannot be created as CANCELLED")]
    CancelledAtCreation,

    #[error("Departure not found: {0}")]
    DepartureNotFound(Uuid),

    #[error("Departure {departure_id} departed on {date}, bookings are closed")]
    PastDeparture {
        departure_id: Uuid,
        date: chrono::NaiveDate,
    },

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Departure sold out: requested {requested}, remaining {remaining}")]
    SoldOut { requested: u32, remaining: u32 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Compensating release failed for booking {booking_id}: {source}")]
    CompensationFailure {
        booking_id: Uuid,
        source: LedgerError,
    },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl BookingError {
    fn from_reserve(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCapacity {
                requested,
                remaining,
            } => BookingError::SoldOut {
                requested,
                remaining,
            },
            other => BookingError::Ledger(other),
        }
    }
}

/// Owns the booking lifecycle and keeps it consistent with the slot
/// ledger and with externally reported payment outcomes.
///
/// Capacity policy: a booking holds slots iff it is CONFIRMED. Every
/// transition that changes capacity ownership does so through exactly one
/// ledger call, and that call's outcome is authoritative.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    departures: Arc<dyn DepartureRepository>,
    ledger: Arc<dyn SlotLedger>,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        departures: Arc<dyn DepartureRepository>,
        ledger: Arc<dyn SlotLedger>,
    ) -> Self {
        Self {
            bookings,
            departures,
            ledger,
        }
    }

    /// Create a booking in PENDING (no capacity claimed) or CONFIRMED
    /// (capacity reserved synchronously; a failed reservation fails the
    /// whole creation, no partial row is left behind).
    pub async fn create_booking(&self, req: NewBooking) -> Result<Booking, BookingError> {
        if req.quantity == 0 {
            return Err(BookingError::InvalidQuantity);
        }
        if req.total_price < Decimal::ZERO {
            return Err(BookingError::InvalidPrice);
        }
        if req.initial_status == BookingStatus::Cancelled {
            return Err(BookingError::CancelledAtCreation);
        }

        let departure = self
            .departures
            .get(req.departure_id)
            .await?
            .ok_or(BookingError::DepartureNotFound(req.departure_id))?;
        if departure.is_past(Utc::now().date_naive()) {
            return Err(BookingError::PastDeparture {
                departure_id: departure.id,
                date: departure.date,
            });
        }

        let reserved = req.initial_status == BookingStatus::Confirmed;
        if reserved {
            self.ledger
                .reserve(req.departure_id, req.quantity)
                .await
                .map_err(BookingError::from_reserve)?;
        }

        let booking = Booking::from_request(&req);
        if let Err(err) = self.bookings.insert(booking.clone()).await {
            if reserved {
                // Give the slots back before surfacing the storage error.
                if let Err(release_err) =
                    self.ledger.release(req.departure_id, req.quantity).await
                {
                    error!(
                        booking_id = %booking.id,
                        %release_err,
                        "failed to release slots after aborted creation"
                    );
                }
            }
            return Err(err.into());
        }

        info!(booking_id = %booking.id, status = %booking.status, "booking created");
        Ok(booking)
    }

    pub async fn get_booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(id)
            .await?
            .ok_or(BookingError::BookingNotFound(id))
    }

    /// Transition a booking, reserving or releasing slots as ownership
    /// changes. Requesting the current status again is a no-op success
    /// that never touches the ledger, so retried payment callbacks are
    /// absorbed here.
    ///
    /// The conditional status flip is the authoritative gate: concurrent
    /// duplicate requests race on `update_status_if`, only the winner
    /// touches the ledger, and losers re-read to absorb or reject.
    pub async fn change_status(
        &self,
        id: Uuid,
        new_status: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let booking = self.get_booking(id).await?;
        let from = booking.status;

        if from == new_status {
            return Ok(booking);
        }
        if from == BookingStatus::Cancelled {
            return Err(BookingError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        let updated = match self.bookings.update_status_if(id, from, new_status).await? {
            Some(updated) => updated,
            None => {
                let current = self.get_booking(id).await?;
                if current.status == new_status {
                    // A concurrent caller already applied this transition.
                    return Ok(current);
                }
                return Err(BookingError::InvalidTransition {
                    from: current.status,
                    to: new_status,
                });
            }
        };

        match (from, new_status) {
            (BookingStatus::Pending, BookingStatus::Confirmed) => {
                if let Err(err) = self
                    .ledger
                    .reserve(booking.departure_id, booking.quantity)
                    .await
                {
                    self.revert_flip(id, new_status, from).await;
                    return Err(BookingError::from_reserve(err));
                }
            }
            (BookingStatus::Confirmed, BookingStatus::Pending)
            | (BookingStatus::Confirmed, BookingStatus::Cancelled) => {
                if let Err(source) = self
                    .ledger
                    .release(booking.departure_id, booking.quantity)
                    .await
                {
                    self.revert_flip(id, new_status, from).await;
                    return Err(BookingError::CompensationFailure {
                        booking_id: id,
                        source,
                    });
                }
            }
            (BookingStatus::Pending, BookingStatus::Cancelled) => {
                // Pending bookings hold no capacity.
            }
            // Same-status and from-Cancelled requests returned above.
            _ => {}
        }

        info!(booking_id = %id, %from, to = %new_status, "booking transitioned");
        Ok(updated)
    }

    /// Best-effort undo of a won status flip after the ledger side of the
    /// transition failed, so status and capacity stay consistent.
    async fn revert_flip(&self, id: Uuid, from: BookingStatus, to: BookingStatus) {
        match self.bookings.update_status_if(id, from, to).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                error!(booking_id = %id, "status moved during rollback, manual review needed");
            }
            Err(err) => {
                error!(booking_id = %id, %err, "failed to roll back status flip");
            }
        }
    }

    /// Hard-delete a booking. A CONFIRMED booking's slots are released
    /// first; if that release fails the delete does not proceed (a blocked
    /// delete beats a capacity leak).
    pub async fn delete_booking(&self, id: Uuid) -> Result<(), BookingError> {
        let booking = self.get_booking(id).await?;

        if booking.status == BookingStatus::Confirmed {
            self.ledger
                .release(booking.departure_id, booking.quantity)
                .await
                .map_err(|source| BookingError::CompensationFailure {
                    booking_id: id,
                    source,
                })?;
        }

        self.bookings.delete(id).await?;
        info!(booking_id = %id, "booking deleted");
        Ok(())
    }

    /// PENDING bookings created more than `max_age` ago. The caller
    /// decides what happens to them; the reconciliation gateway's stale
    /// sweep is the production consumer.
    pub async fn list_stale_pending(&self, max_age: Duration) -> Result<Vec<Booking>, BookingError> {
        let cutoff = Utc::now() - max_age;
        Ok(self.bookings.list_pending_before(cutoff).await?)
    }
}
