pub mod access;
pub mod events;
pub mod models;
pub mod payment;
pub mod repository;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use access::{Actor, Capability, Role};
pub use events::{EventSink, TracingEventSink};
pub use repository::{BookingStore, StoreError, StoreResult};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Slot on court {court_id} starting {start} is not available")]
    SlotConflict {
        court_id: Uuid,
        start: DateTime<Utc>,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Ticket already used at {used_at}")]
    AlreadyUsed {
        used_at: DateTime<Utc>,
    },

    #[error("Check-in is open from {opens_at} to {closes_at}")]
    OutsideWindow {
        opens_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    },

    #[error("Payment gateway error: {0}")]
    PaymentError(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Hold expired at {expired_at}")]
    ExpiredHold {
        expired_at: DateTime<Utc>,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound { entity, id: id.to_string() }
    }

    /// True for failures caused by the caller's request rather than by the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            CoreError::InvariantViolation(_) | CoreError::Storage(_) | CoreError::PaymentError(_)
        )
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
