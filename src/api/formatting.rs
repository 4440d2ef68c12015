//! Estimate output formatting
//!
//! Renders a published estimate either as a human-readable line for the
//! console or as JSON for an external renderer.

use crate::api::types::AnchorMarker;
use crate::core::{FitQuality, GeometryQuality, PositionEstimate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Flattened view of an estimate, rounded for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedEstimate {
    pub x_m: f64,
    pub y_m: f64,
    pub rms_residual_m: f64,
    pub fit: FitQuality,
    pub geometry: GeometryQuality,
    /// Measured range per anchor (meters)
    pub ranges: BTreeMap<String, f64>,
    pub iterations: usize,
    pub timestamp_ms: u64,
    /// Anchor overlay, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchors: Option<Vec<AnchorMarker>>,
}

/// Converts estimates into [`FormattedEstimate`]s
#[derive(Debug, Clone)]
pub struct EstimateFormatter {
    /// Decimal places kept in coordinates and ranges
    precision: u8,
}

impl Default for EstimateFormatter {
    fn default() -> Self {
        Self { precision: 3 }
    }
}

impl EstimateFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision.min(12);
        self
    }

    pub fn format(&self, estimate: &PositionEstimate) -> FormattedEstimate {
        FormattedEstimate {
            x_m: self.round_to_precision(estimate.position.x),
            y_m: self.round_to_precision(estimate.position.y),
            rms_residual_m: self.round_to_precision(estimate.rms_residual),
            fit: estimate.fit,
            geometry: estimate.geometry,
            ranges: estimate
                .measurements
                .iter()
                .map(|(id, range)| (id.to_string(), self.round_to_precision(range.meters())))
                .collect(),
            iterations: estimate.iterations,
            timestamp_ms: estimate.timestamp_ms,
            anchors: None,
        }
    }

    /// Format and attach the anchor overlay
    pub fn format_with_anchors(
        &self,
        estimate: &PositionEstimate,
        anchors: Vec<AnchorMarker>,
    ) -> FormattedEstimate {
        let mut formatted = self.format(estimate);
        formatted.anchors = Some(anchors);
        formatted
    }

    fn round_to_precision(&self, value: f64) -> f64 {
        let multiplier = 10_f64.powi(self.precision as i32);
        (value * multiplier).round() / multiplier
    }
}

/// Human-readable text formatter
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    /// Single line without per-anchor ranges
    pub compact: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_text(&self, formatted: &FormattedEstimate) -> String {
        let flag = match (formatted.fit, formatted.geometry) {
            (FitQuality::Converged, GeometryQuality::Good) => "",
            (FitQuality::BestEffort, _) => " [best effort]",
            (_, GeometryQuality::Collinear) => " [collinear anchors]",
            (_, GeometryQuality::Coincident) => " [coincident anchors]",
        };

        let mut output = format!(
            "position x={:.2} m y={:.2} m rms={:.3} m{}",
            formatted.x_m, formatted.y_m, formatted.rms_residual_m, flag
        );
        if !self.compact {
            let ranges: Vec<String> = formatted
                .ranges
                .iter()
                .map(|(id, meters)| format!("{}={:.2}", id, meters))
                .collect();
            output.push_str(&format!(" | ranges {}", ranges.join(" ")));
        }
        output
    }
}

/// JSON formatter for structured output
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, formatted: &FormattedEstimate) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(formatted)
        } else {
            serde_json::to_string(formatted)
        }
    }
}
