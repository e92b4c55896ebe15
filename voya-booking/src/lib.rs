pub mod manager;

pub use manager::{BookingError, BookingManager};
