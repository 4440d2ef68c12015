//! Deployment configuration

pub mod config;

pub use config::{AnchorConfig, ConfigError, SystemConfig, ValidationResult};
