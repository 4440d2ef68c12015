//! Positioning cycle driver and its outward-facing types
//!
//! The scheduler publishes estimates through an [`EstimateHandle`] that a
//! renderer polls; the formatters turn an estimate into console text or JSON.

pub mod scheduler;
pub mod types;
pub mod formatting;

pub use scheduler::CycleScheduler;
pub use types::{AnchorMarker, EstimateHandle, SystemState};
pub use formatting::{EstimateFormatter, FormattedEstimate, JsonFormatter, TextFormatter};
