//! Signal source that reads the link RSSI reported by `iwconfig <interface>`
//!
//! Linux wireless-tools print a line such as
//! `Link Quality=52/70  Signal level=-58 dBm` for an associated interface.

use crate::hardware::{SignalError, SignalResult, SignalSource};
use std::process::Command;

const SIGNAL_LEVEL_KEY: &str = "Signal level=";

/// Reads one RSSI sample per call by running `iwconfig`
#[derive(Debug, Clone)]
pub struct IwconfigSignalSource {
    interface: String,
    program: String,
}

impl IwconfigSignalSource {
    /// Create a reader for the default interface `wlan0`
    pub fn new() -> Self {
        Self::with_interface("wlan0")
    }

    pub fn with_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            program: "iwconfig".to_string(),
        }
    }

    /// Run a different binary with the same output format
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for IwconfigSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for IwconfigSignalSource {
    fn read_rssi(&mut self) -> SignalResult<i32> {
        let command = format!("{} {}", self.program, self.interface);
        let output = Command::new(&self.program)
            .arg(&self.interface)
            .output()
            .map_err(|e| SignalError::CommandFailed {
                command: command.clone(),
                details: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SignalError::CommandFailed {
                command,
                details: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_signal_level(&stdout, &self.interface)
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

/// Extract the first `Signal level=<n>` value from iwconfig output
pub fn parse_signal_level(output: &str, interface: &str) -> SignalResult<i32> {
    let line = output
        .lines()
        .find(|line| line.contains(SIGNAL_LEVEL_KEY))
        .ok_or_else(|| SignalError::NoSignalLevel {
            interface: interface.to_string(),
        })?;

    let raw = line
        .split(SIGNAL_LEVEL_KEY)
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("");

    // Some drivers append the unit without a space ("-58dBm") or report a ratio
    let numeric: String = raw
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(_, c)| c)
        .collect();

    numeric.parse::<i32>().map_err(|_| SignalError::InvalidSignalLevel {
        raw: raw.to_string(),
    })
}
