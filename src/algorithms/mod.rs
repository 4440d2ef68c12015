//! Core positioning algorithms

pub mod range_model;
pub mod simplex;
pub mod geometry;
pub mod multilateration;

pub use range_model::{estimate_distance, RangeModel};
pub use simplex::{Minimum, NelderMead};
pub use geometry::{assess_geometry, GeometryAssessment};
pub use multilateration::{PositionSolver, SolverConfig};
