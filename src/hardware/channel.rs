//! Seams to the outside world: the report channel and the signal source

use crate::hardware::{IncomingReport, SignalResult};
use std::io;
use std::time::Instant;

/// Source of range reports sent by remote anchors
pub trait ReportChannel {
    /// Wait for the next report until `deadline`.
    /// Returns Ok(Some(report)) when a sender connected and its payload was read
    /// Returns Ok(None) once the deadline has passed without a connection
    /// Returns Err(error) if the endpoint itself fails
    fn next_report(&mut self, deadline: Instant) -> io::Result<Option<IncomingReport>>;

    /// Drop every report already waiting without blocking.
    /// Returns how many were dropped.
    fn discard_pending(&mut self) -> io::Result<usize>;

    /// Human-readable description of the endpoint for logs
    fn describe(&self) -> String;
}

/// Errors that end a single sender's connection but leave the endpoint usable
pub fn is_connection_error(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::TimedOut
    )
}

/// Link-layer signal strength reader for the local anchor
pub trait SignalSource {
    /// Read one RSSI sample in dBm
    fn read_rssi(&mut self) -> SignalResult<i32>;

    /// Radio interface the readings come from
    fn interface(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_per_sender() {
        assert!(is_connection_error(io::ErrorKind::ConnectionAborted));
        assert!(is_connection_error(io::ErrorKind::ConnectionReset));
        assert!(is_connection_error(io::ErrorKind::TimedOut));
        assert!(!is_connection_error(io::ErrorKind::PermissionDenied));
        assert!(!is_connection_error(io::ErrorKind::Other));
        assert!(!is_connection_error(io::ErrorKind::WouldBlock));
    }
}
