//! Hardware abstraction layer for anchor communication
//!
//! This module provides the rendezvous endpoint that remote anchors report to,
//! the sender used on the anchor side, and the local signal strength readers.

pub mod channel;
pub mod endpoint;
pub mod iwconfig;
pub mod mock;
pub mod error;

pub use channel::{is_connection_error, ReportChannel, SignalSource};
pub use endpoint::{bind_rendezvous, send_range_report, TcpReportChannel};
pub use iwconfig::IwconfigSignalSource;
pub use mock::{MockReportChannel, MockSignalSource};
pub use error::{SignalError, SignalResult};

use std::net::IpAddr;

/// One connection's worth of data received at the rendezvous endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingReport {
    /// Declared source identity of the connection
    pub peer: IpAddr,
    /// Bytes read from the connection, at most one byte past a record
    pub payload: Vec<u8>,
    pub received_at_ms: u64,
}

impl IncomingReport {
    pub fn new(peer: IpAddr, payload: Vec<u8>) -> Self {
        Self {
            peer,
            payload,
            received_at_ms: 0, // Will be set by channel implementation
        }
    }

    pub fn with_timestamp(mut self, received_at_ms: u64) -> Self {
        self.received_at_ms = received_at_ms;
        self
    }
}
