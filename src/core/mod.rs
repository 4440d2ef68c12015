//! Core types and constants for the positioning pipeline

pub mod types;
pub mod constants;
pub mod clock;

pub use types::*;
pub use constants::*;
pub use clock::current_time_ms;
