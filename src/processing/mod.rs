//! Wire decoding and measurement collection

pub mod parser;
pub mod collector;

pub use parser::{decode_record, encode_record, parse_range, RecordError};
pub use collector::{CollectorStats, MeasurementCollector};
