pub mod availability;
pub mod pricing;
pub mod promo;
pub mod venue;

pub use availability::{AvailabilityCalculator, Slot};
pub use pricing::{money, PeakWindow, PriceRequest, PricingConfig, PricingEngine};
pub use venue::Venue;
