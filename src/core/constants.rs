//! Calibration defaults and protocol parameters

/// Path-loss exponent fitted for the reference classroom deployment.
///
/// Stored signed, as produced by the calibration regression.
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = -2.071;

/// RSSI observed at one meter from the device in the reference deployment (dBm)
pub const DEFAULT_REFERENCE_RSSI_AT_1M: f64 = -32.817;

/// Size of one range record on the wire (big-endian IEEE-754 single)
pub const RECORD_LEN: usize = 4;

/// Default TCP port of the rendezvous endpoint
pub const DEFAULT_RENDEZVOUS_PORT: u16 = 1234;

/// Default pending-connection backlog of the rendezvous endpoint
pub const DEFAULT_LISTEN_BACKLOG: i32 = 5;

/// Default interval between cycle starts (milliseconds)
pub const DEFAULT_CYCLE_PERIOD_MS: u64 = 4000;

/// Default hard deadline for collecting one measurement set (milliseconds)
pub const DEFAULT_COLLECTION_TIMEOUT_MS: u64 = 3000;

/// Poll interval of the non-blocking accept loop (milliseconds)
pub const ACCEPT_POLL_INTERVAL_MS: u64 = 10;
