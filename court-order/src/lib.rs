pub mod manager;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod retry;
pub mod tickets;

pub use manager::{
    Cancellation, CourtAvailability, HoldRequest, Quote, ReservationDetails, ReservationManager,
    SettlementOutcome,
};
pub use memory::InMemoryBookingStore;
pub use orchestrator::{
    CancellationReceipt, MockPaymentGateway, PaymentOrchestrator, PollOutcome, RefundOutcome,
};
pub use policy::{BookingPolicy, RefundDecision, RefundKind};
pub use retry::RetryPolicy;
pub use tickets::{RedemptionReceipt, TicketService};
