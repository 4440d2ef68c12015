use crate::algorithms::geometry::assess_geometry;
use crate::algorithms::multilateration::SolverConfig;
use crate::algorithms::range_model::RangeModel;
use crate::core::{
    AnchorGeometry, AnchorId, Coordinate, GeometryQuality, ACCEPT_POLL_INTERVAL_MS,
    DEFAULT_COLLECTION_TIMEOUT_MS, DEFAULT_CYCLE_PERIOD_MS, DEFAULT_LISTEN_BACKLOG,
    DEFAULT_PATH_LOSS_EXPONENT, DEFAULT_REFERENCE_RSSI_AT_1M, DEFAULT_RENDEZVOUS_PORT,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Deployment configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Path-loss exponent of the range model (signed, negative indoors)
    pub path_loss_exponent: f64,
    /// RSSI measured at one meter from the transmitter (dBm)
    pub reference_rssi_at_1m: f64,
    /// Start-to-start period of positioning cycles (milliseconds)
    pub cycle_period_ms: u64,
    /// Hard deadline for collecting every anchor's report (milliseconds)
    pub collection_timeout_ms: u64,
    /// Per-connection read timeout at the rendezvous endpoint (milliseconds)
    pub read_timeout_ms: u64,
    /// Address the locator listens on for anchor reports
    pub rendezvous_address: SocketAddr,
    pub listen_backlog: i32,
    /// Anchor co-located with the locator; its range comes from the local radio
    pub local_anchor: AnchorId,
    /// Wireless interface the local RSSI is read from
    pub signal_interface: String,
    pub solver: SolverConfig,
    pub anchors: Vec<AnchorConfig>,
}

/// One anchor of the deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub id: AnchorId,
    /// Network identity the anchor reports from
    pub address: IpAddr,
    /// Fixed position in the room (meters)
    pub position: Coordinate,
}

impl AnchorConfig {
    pub fn new(id: &str, address: Ipv4Addr, x: f64, y: f64) -> Self {
        Self {
            id: AnchorId::from(id),
            address: IpAddr::V4(address),
            position: Coordinate::new(x, y),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value {value} for {parameter}: {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
    #[error("missing required parameter {parameter}")]
    MissingParameter { parameter: String },
    #[error("configuration I/O error: {message}")]
    IoError { message: String },
    #[error("configuration format error: {message}")]
    SerializationError { message: String },
    #[error("anchor {anchor_id}: {reason}")]
    AnchorConflict { anchor_id: AnchorId, reason: String },
    #[error("anchor geometry rejected: {reason}")]
    GeometryValidation { reason: String },
}

/// Configuration validation result
#[derive(Debug)]
pub struct ValidationResult {
    /// Whether configuration is valid
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// First error, if any
    pub fn into_result(self) -> Result<Vec<String>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.warnings),
        }
    }
}

impl Default for SystemConfig {
    /// Reference deployment: an 8 m × 7 m room with an anchor in each corner
    fn default() -> Self {
        Self {
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
            reference_rssi_at_1m: DEFAULT_REFERENCE_RSSI_AT_1M,
            cycle_period_ms: DEFAULT_CYCLE_PERIOD_MS,
            collection_timeout_ms: DEFAULT_COLLECTION_TIMEOUT_MS,
            read_timeout_ms: 500,
            rendezvous_address: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                DEFAULT_RENDEZVOUS_PORT,
            ),
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            local_anchor: AnchorId::from("a1"),
            signal_interface: "wlan0".to_string(),
            solver: SolverConfig::default(),
            anchors: vec![
                AnchorConfig::new("a1", Ipv4Addr::new(172, 20, 10, 4), 0.0, 0.0),
                AnchorConfig::new("a2", Ipv4Addr::new(172, 20, 10, 3), 0.0, 7.0),
                AnchorConfig::new("a3", Ipv4Addr::new(172, 20, 10, 6), 8.0, 0.0),
                AnchorConfig::new("a4", Ipv4Addr::new(172, 20, 10, 5), 8.0, 7.0),
            ],
        }
    }
}

impl SystemConfig {
    /// Load configuration from a JSON file and reject it if invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: SystemConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to parse config file '{}': {}", path_str, e),
            })?;

        config.validate().into_result()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to serialize config: {}", e),
            })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    pub fn range_model(&self) -> RangeModel {
        RangeModel::new(self.path_loss_exponent, self.reference_rssi_at_1m)
    }

    /// Anchor id → coordinate table
    pub fn geometry(&self) -> Result<AnchorGeometry, ConfigError> {
        AnchorGeometry::new(self.anchors.iter().map(|a| (a.id.clone(), a.position)))
    }

    /// Sender address → anchor id for every remote anchor
    pub fn identity_table(&self) -> HashMap<IpAddr, AnchorId> {
        self.anchors
            .iter()
            .filter(|a| a.id != self.local_anchor)
            .map(|a| (a.address, a.id.clone()))
            .collect()
    }

    pub fn anchor(&self, id: &AnchorId) -> Option<&AnchorConfig> {
        self.anchors.iter().find(|a| &a.id == id)
    }

    /// Where remote anchors send their reports: the local anchor's address
    /// on the rendezvous port
    pub fn collector_address(&self) -> Option<SocketAddr> {
        self.anchor(&self.local_anchor)
            .map(|a| SocketAddr::new(a.address, self.rendezvous_address.port()))
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.collection_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Check the whole configuration, collecting every problem found
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Range model
        if !self.path_loss_exponent.is_finite() || self.path_loss_exponent >= 0.0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "path_loss_exponent".to_string(),
                value: self.path_loss_exponent.to_string(),
                reason: "exponent must be finite and negative so that distance falls as RSSI rises"
                    .to_string(),
            });
        }
        if !self.reference_rssi_at_1m.is_finite() {
            errors.push(ConfigError::InvalidParameter {
                parameter: "reference_rssi_at_1m".to_string(),
                value: self.reference_rssi_at_1m.to_string(),
                reason: "reference RSSI must be finite".to_string(),
            });
        } else if self.reference_rssi_at_1m > 0.0 {
            warnings.push("Positive reference RSSI at 1 m is implausible for Wi-Fi".to_string());
        }

        // Timing
        if self.cycle_period_ms == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "cycle_period_ms".to_string(),
                value: self.cycle_period_ms.to_string(),
                reason: "cycle period must be positive".to_string(),
            });
        }
        if self.collection_timeout_ms < ACCEPT_POLL_INTERVAL_MS {
            errors.push(ConfigError::InvalidParameter {
                parameter: "collection_timeout_ms".to_string(),
                value: self.collection_timeout_ms.to_string(),
                reason: format!("collection timeout must be at least {} ms", ACCEPT_POLL_INTERVAL_MS),
            });
        } else if self.collection_timeout_ms > self.cycle_period_ms {
            warnings.push(
                "Collection timeout exceeds the cycle period; cycles will run back to back".to_string(),
            );
        }
        if self.read_timeout_ms == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "read_timeout_ms".to_string(),
                value: self.read_timeout_ms.to_string(),
                reason: "read timeout must be positive".to_string(),
            });
        }
        if self.listen_backlog <= 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "listen_backlog".to_string(),
                value: self.listen_backlog.to_string(),
                reason: "backlog must be positive".to_string(),
            });
        }

        // Anchors
        match self.geometry() {
            Ok(geometry) => {
                if geometry.len() < 3 {
                    errors.push(ConfigError::GeometryValidation {
                        reason: format!(
                            "Only {} anchors configured, at least 3 required for 2D positioning",
                            geometry.len()
                        ),
                    });
                } else {
                    match assess_geometry(&geometry).quality {
                        GeometryQuality::Good => {}
                        GeometryQuality::Collinear => warnings.push(
                            "Anchors are collinear; positions will be mirror-ambiguous".to_string(),
                        ),
                        GeometryQuality::Coincident => warnings.push(
                            "Anchors share one location; only the distance is observable".to_string(),
                        ),
                    }
                }
                if !geometry.contains(&self.local_anchor) {
                    errors.push(ConfigError::AnchorConflict {
                        anchor_id: self.local_anchor.clone(),
                        reason: "local anchor is not in the anchor table".to_string(),
                    });
                }
            }
            Err(err) => errors.push(err),
        }

        let mut seen = HashSet::new();
        for anchor in &self.anchors {
            if !seen.insert(anchor.address) {
                errors.push(ConfigError::AnchorConflict {
                    anchor_id: anchor.id.clone(),
                    reason: format!("address {} is shared with another anchor", anchor.address),
                });
            }
        }

        if let Some(guess) = self.solver.initial_guess {
            if !guess.is_finite() {
                errors.push(ConfigError::InvalidParameter {
                    parameter: "solver.initial_guess".to_string(),
                    value: format!("({}, {})", guess.x, guess.y),
                    reason: "initial guess must be finite".to_string(),
                });
            }
        }
        if let Some(step) = self.solver.initial_step_m {
            if !step.is_finite() || step <= 0.0 {
                errors.push(ConfigError::InvalidParameter {
                    parameter: "solver.initial_step_m".to_string(),
                    value: step.to_string(),
                    reason: "initial step must be positive".to_string(),
                });
            }
        }
        if self.solver.termination.max_iterations == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "solver.max_iterations".to_string(),
                value: "0".to_string(),
                reason: "solver needs at least one iteration".to_string(),
            });
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_system_config() {
        let config = SystemConfig::default();
        assert_eq!(config.path_loss_exponent, -2.071);
        assert_eq!(config.reference_rssi_at_1m, -32.817);
        assert_eq!(config.cycle_period(), Duration::from_secs(4));
        assert_eq!(config.rendezvous_address.port(), 1234);
        assert_eq!(config.anchors.len(), 4);

        let result = config.validate();
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_identity_table_excludes_local_anchor() {
        let config = SystemConfig::default();
        let table = config.identity_table();
        assert_eq!(table.len(), 3);
        assert!(!table.values().any(|id| id == &config.local_anchor));
        assert_eq!(
            table.get(&IpAddr::V4(Ipv4Addr::new(172, 20, 10, 3))),
            Some(&AnchorId::from("a2"))
        );
    }

    #[test]
    fn test_collector_address_uses_local_anchor() {
        let config = SystemConfig::default();
        assert_eq!(
            config.collector_address(),
            Some("172.20.10.4:1234".parse().unwrap())
        );
    }

    #[test]
    fn test_positive_exponent_rejected() {
        let config = SystemConfig {
            path_loss_exponent: 2.071,
            ..SystemConfig::default()
        };
        let result = config.validate();
        assert!(!result.is_valid);
        assert!(matches!(
            &result.errors[0],
            ConfigError::InvalidParameter { parameter, .. } if parameter == "path_loss_exponent"
        ));
    }

    #[test]
    fn test_unknown_local_anchor_rejected() {
        let config = SystemConfig {
            local_anchor: AnchorId::from("basement"),
            ..SystemConfig::default()
        };
        let result = config.validate();
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, ConfigError::AnchorConflict { anchor_id, .. } if anchor_id.as_str() == "basement")));
    }

    #[test]
    fn test_shared_address_rejected() {
        let mut config = SystemConfig::default();
        config.anchors[2].address = config.anchors[1].address;
        assert!(!config.validate().is_valid);
    }

    #[test]
    fn test_too_few_anchors_rejected() {
        let mut config = SystemConfig::default();
        config.anchors.truncate(2);
        let result = config.validate();
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, ConfigError::GeometryValidation { .. })));
    }

    #[test]
    fn test_collinear_layout_warns() {
        let mut config = SystemConfig::default();
        for (i, anchor) in config.anchors.iter_mut().enumerate() {
            anchor.position = Coordinate::new(i as f64 * 2.0, 0.0);
        }
        let result = config.validate();
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_long_collection_timeout_warns() {
        let config = SystemConfig {
            collection_timeout_ms: 10_000,
            ..SystemConfig::default()
        };
        let result = config.validate();
        assert!(result.is_valid);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{ "cycle_period_ms": 2000, "local_anchor": "a1" }"#;
        let config: SystemConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cycle_period_ms, 2000);
        assert_eq!(config.anchors, SystemConfig::default().anchors);
        assert_eq!(config.solver.termination.max_iterations, 400);
    }

    #[test]
    fn test_partial_solver_section_uses_defaults() {
        let json = r#"{ "solver": { "initial_guess": { "x": 1.0, "y": 1.0 } } }"#;
        let config: SystemConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.solver.initial_guess, Some(Coordinate::new(1.0, 1.0)));
        assert_eq!(config.solver.termination.max_iterations, 400);
        assert_eq!(config.solver.termination.xatol, 1e-4);
        assert!(config.validate().is_valid);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = SystemConfig::default();
        config.solver.initial_guess = Some(Coordinate::new(1.0, 1.0));
        config.anchors[3].position = Coordinate::new(8.5, 7.25);

        let temp_path = std::env::temp_dir().join(format!(
            "rssi_positioning_config_{}.json",
            std::process::id()
        ));

        config.save_to_file(&temp_path).unwrap();
        let loaded = SystemConfig::from_file(&temp_path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_file(temp_path);
    }

    #[test]
    fn test_missing_file_reports_io_error() {
        let path = PathBuf::from("/nonexistent/rssi-positioning.json");
        assert!(matches!(
            SystemConfig::from_file(path),
            Err(ConfigError::IoError { .. })
        ));
    }

    #[test]
    fn test_invalid_json_reports_serialization_error() {
        let temp_path = std::env::temp_dir().join(format!(
            "rssi_positioning_bad_{}.json",
            std::process::id()
        ));
        fs::write(&temp_path, "{ not json").unwrap();
        assert!(matches!(
            SystemConfig::from_file(&temp_path),
            Err(ConfigError::SerializationError { .. })
        ));
        let _ = fs::remove_file(temp_path);
    }
}
