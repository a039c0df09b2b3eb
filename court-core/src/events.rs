use async_trait::async_trait;
use court_shared::BookingEvent;

/// Destination for booking lifecycle events. Publication is best-effort:
/// a failure here never rolls back a committed transition.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: BookingEvent);
}

/// Logs events instead of shipping them anywhere.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: BookingEvent) {
        tracing::info!(
            kind = event.kind(),
            reservation_id = %event.reservation_id(),
            "Booking event"
        );
    }
}
