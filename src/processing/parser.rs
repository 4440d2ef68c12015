//! Wire codec for range records
//!
//! A record is a single IEEE-754 single-precision float in network byte order
//! carrying the sender's range estimate in meters. One record travels per
//! connection.

use crate::core::{RangeEstimate, RECORD_LEN};
use thiserror::Error;

/// Errors that can occur while decoding a range record
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("range is not a finite number ({value})")]
    NotFinite { value: f32 },
    #[error("range is negative ({value})")]
    Negative { value: f32 },
}

/// Pack a range into its wire representation
pub fn encode_record(range: RangeEstimate) -> [u8; RECORD_LEN] {
    (range.meters() as f32).to_be_bytes()
}

/// Unpack the raw float of a record without range validation
pub fn decode_record(payload: &[u8]) -> Result<f32, RecordError> {
    let bytes: [u8; RECORD_LEN] = payload.try_into().map_err(|_| RecordError::WrongLength {
        expected: RECORD_LEN,
        actual: payload.len(),
    })?;
    Ok(f32::from_be_bytes(bytes))
}

/// Decode a record into a validated range estimate
pub fn parse_range(payload: &[u8]) -> Result<RangeEstimate, RecordError> {
    let value = decode_record(payload)?;
    if !value.is_finite() {
        return Err(RecordError::NotFinite { value });
    }
    if value < 0.0 {
        return Err(RecordError::Negative { value });
    }
    RangeEstimate::new(f64::from(value)).ok_or(RecordError::NotFinite { value })
}
