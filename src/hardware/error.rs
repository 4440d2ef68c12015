//! Signal source error types

use thiserror::Error;

/// Failures while querying link-layer signal strength
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// The query command could not be run
    #[error("failed to run `{command}`: {details}")]
    CommandFailed { command: String, details: String },
    /// The command ran but its output carried no signal level
    #[error("no signal level reported for interface {interface}")]
    NoSignalLevel { interface: String },
    /// A signal level was present but not an integer dBm value
    #[error("unparsable signal level '{raw}'")]
    InvalidSignalLevel { raw: String },
    /// A scripted source ran out of readings
    #[error("signal source {interface} has no reading available")]
    Exhausted { interface: String },
}

/// Result type for signal source operations
pub type SignalResult<T> = Result<T, SignalError>;
