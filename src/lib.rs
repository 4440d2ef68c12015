//! RSSI Indoor Positioning
//!
//! Estimates the planar position of a wireless device inside a room from
//! signal-strength-derived ranges taken at a fixed set of anchors. Each cycle
//! converts the local RSSI to a range, collects one range per remote anchor
//! over TCP and solves a nonlinear least-squares multilateration.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod hardware;
pub mod api;

// Re-export commonly used types
pub use core::{
    AnchorGeometry, AnchorId, Coordinate, FitQuality, GeometryQuality, MeasurementSet,
    PositionEstimate, RangeEstimate, RssiSample,
};
pub use algorithms::{estimate_distance, PositionSolver, RangeModel, SolverConfig};
pub use processing::{MeasurementCollector, CollectorStats};
pub use validation::{ErrorSeverity, PositioningError, PositioningResult};
pub use utils::{ConfigError, SystemConfig};
pub use hardware::{
    send_range_report, IwconfigSignalSource, ReportChannel, SignalError, SignalSource,
    TcpReportChannel,
};
pub use api::{CycleScheduler, EstimateHandle, SystemState};
