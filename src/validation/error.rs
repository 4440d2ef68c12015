//! Error classification for the positioning pipeline

use crate::core::AnchorId;
use crate::hardware::error::SignalError;
use crate::utils::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

/// Result type for pipeline operations
pub type PositioningResult<T> = Result<T, PositioningError>;

/// Everything that can go wrong between a radio reading and a published estimate
#[derive(Debug, Error)]
pub enum PositioningError {
    /// Wrong-sized or unparsable wire payload
    #[error("malformed range record from {peer}: {reason}")]
    MalformedRecord { peer: IpAddr, reason: String },

    /// Connection from an address outside the configured anchor set
    #[error("report from unknown identity {peer}")]
    UnknownIdentity { peer: IpAddr },

    /// Second record for an anchor already filled this cycle
    #[error("duplicate report for anchor {anchor} from {peer}")]
    DuplicateReport { anchor: AnchorId, peer: IpAddr },

    /// Collection deadline passed with anchors still unreported
    #[error("incomplete measurement, missing anchors: {}", format_ids(.missing))]
    IncompleteMeasurement { missing: Vec<AnchorId> },

    /// Optimizer hit its iteration cap; the estimate is best-effort
    #[error("solver stopped after {iterations} iterations without converging (residual {residual:.4})")]
    SolverNonconvergence { iterations: usize, residual: f64 },

    /// Range attributed to an anchor that is not part of the geometry
    #[error("range for anchor {anchor} which is not in the geometry")]
    UnknownAnchor { anchor: AnchorId },

    /// A range that is negative or not finite
    #[error("invalid range {value} m for anchor {anchor}")]
    InvalidRange { anchor: AnchorId, value: f64 },

    /// Initial guess or other solver input outside the real plane
    #[error("invalid solver input: {details}")]
    InvalidInput { details: String },

    #[error("signal source failure: {0}")]
    Signal(#[from] SignalError),

    #[error("rendezvous endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

fn format_ids(ids: &[AnchorId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Warning, // Potential issue, estimate still produced
    Low,     // One report dropped, cycle may still complete
    High,    // Cycle aborted, previous estimate retained
}

/// Where an error is absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorScope {
    /// Absorbed by the collector; the offending connection is dropped
    Connection,
    /// Ends the current cycle; surfaced to the scheduler
    Cycle,
    /// Informational; the estimate is flagged instead
    Estimate,
}

impl PositioningError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            PositioningError::MalformedRecord { .. }
            | PositioningError::UnknownIdentity { .. }
            | PositioningError::DuplicateReport { .. } => ErrorScope::Connection,
            PositioningError::SolverNonconvergence { .. } => ErrorScope::Estimate,
            PositioningError::IncompleteMeasurement { .. }
            | PositioningError::UnknownAnchor { .. }
            | PositioningError::InvalidRange { .. }
            | PositioningError::InvalidInput { .. }
            | PositioningError::Signal(_)
            | PositioningError::Io(_)
            | PositioningError::Config(_) => ErrorScope::Cycle,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.scope() {
            ErrorScope::Estimate => ErrorSeverity::Warning,
            ErrorScope::Connection => ErrorSeverity::Low,
            ErrorScope::Cycle => ErrorSeverity::High,
        }
    }

    /// Check if this error ends the current measurement cycle
    pub fn aborts_cycle(&self) -> bool {
        self.scope() == ErrorScope::Cycle
    }
}
