pub mod models;
pub mod pii;

pub use models::events::BookingEvent;
pub use pii::Masked;
