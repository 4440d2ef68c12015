//! Error classification for the positioning pipeline

pub mod error;

pub use error::{ErrorScope, ErrorSeverity, PositioningError, PositioningResult};
