//! Log-distance path-loss model

use crate::core::{RssiSample, DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_RSSI_AT_1M};
use serde::{Deserialize, Serialize};

/// Convert an RSSI reading to a distance in meters.
///
/// `distance = 10 ^ ((rssi - reference_rssi_at_1m) / (10 * path_loss_exponent))`
///
/// Pure and total: implausible readings (0 dBm, positive dBm) simply yield
/// whatever the formula gives.
pub fn estimate_distance(rssi_dbm: i32, path_loss_exponent: f64, reference_rssi_at_1m: f64) -> f64 {
    let exponent = (f64::from(rssi_dbm) - reference_rssi_at_1m) / (10.0 * path_loss_exponent);
    10f64.powf(exponent)
}

/// Calibrated range model for one deployment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeModel {
    pub path_loss_exponent: f64,
    pub reference_rssi_at_1m: f64,
}

impl Default for RangeModel {
    fn default() -> Self {
        Self {
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
            reference_rssi_at_1m: DEFAULT_REFERENCE_RSSI_AT_1M,
        }
    }
}

impl RangeModel {
    pub fn new(path_loss_exponent: f64, reference_rssi_at_1m: f64) -> Self {
        Self {
            path_loss_exponent,
            reference_rssi_at_1m,
        }
    }

    pub fn distance(&self, rssi_dbm: i32) -> f64 {
        estimate_distance(rssi_dbm, self.path_loss_exponent, self.reference_rssi_at_1m)
    }

    pub fn estimate(&self, sample: &RssiSample) -> f64 {
        self.distance(sample.rssi_dbm)
    }
}
