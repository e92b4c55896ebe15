pub mod booking;
pub mod departure;
pub mod payment;
pub mod repository;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use departure::Departure;
pub use payment::{CallbackAudit, PaymentOutcome, PaymentRecord};
pub use repository::{
    BookingRepository, DepartureRepository, PaymentAuditRepository, RepositoryError,
};
