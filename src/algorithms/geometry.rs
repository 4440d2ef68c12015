//! Anchor layout assessment
//!
//! Multilateration in the plane needs at least three anchors that are not on
//! one line. Collinear anchors leave the fit mirror-ambiguous across that
//! line; coincident anchors leave only the radius observable.

use crate::core::{AnchorGeometry, GeometryQuality};
use nalgebra::{Matrix2, Vector2};

/// Minimum triangle area relative to the squared anchor baseline
const MIN_RELATIVE_AREA: f64 = 1e-6;

/// Baselines shorter than this (meters) count as a single location
const COINCIDENT_BASELINE_M: f64 = 1e-9;

/// Geometry assessment result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryAssessment {
    pub quality: GeometryQuality,
    /// Longest distance between any two anchors (meters)
    pub max_baseline: f64,
    /// Largest triangle formed by any three anchors (m²)
    pub max_triangle_area: f64,
    /// Ratio of the principal spreads of the anchor cloud
    pub condition_number: f64,
}

/// Classify the anchor layout of `geometry`
pub fn assess_geometry(geometry: &AnchorGeometry) -> GeometryAssessment {
    let positions: Vec<Vector2<f64>> = geometry
        .iter()
        .map(|(_, c)| Vector2::new(c.x, c.y))
        .collect();
    assess_positions(&positions)
}

pub fn assess_positions(positions: &[Vector2<f64>]) -> GeometryAssessment {
    let mut max_baseline: f64 = 0.0;
    for i in 0..positions.len() {
        for j in i + 1..positions.len() {
            max_baseline = max_baseline.max((positions[i] - positions[j]).norm());
        }
    }

    let mut max_triangle_area: f64 = 0.0;
    for i in 0..positions.len() {
        for j in i + 1..positions.len() {
            for k in j + 1..positions.len() {
                let a = positions[j] - positions[i];
                let b = positions[k] - positions[i];
                let area = (a.x * b.y - a.y * b.x).abs() / 2.0;
                max_triangle_area = max_triangle_area.max(area);
            }
        }
    }

    let condition_number = spread_condition_number(positions);

    let quality = if max_baseline < COINCIDENT_BASELINE_M {
        GeometryQuality::Coincident
    } else if max_triangle_area < MIN_RELATIVE_AREA * max_baseline.powi(2) {
        GeometryQuality::Collinear
    } else {
        GeometryQuality::Good
    };

    GeometryAssessment {
        quality,
        max_baseline,
        max_triangle_area,
        condition_number,
    }
}

/// sqrt(λmax / λmin) of the anchor scatter matrix; infinite when degenerate
fn spread_condition_number(positions: &[Vector2<f64>]) -> f64 {
    if positions.is_empty() {
        return f64::INFINITY;
    }
    let n = positions.len() as f64;
    let mean = positions.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let scatter = positions
        .iter()
        .fold(Matrix2::zeros(), |acc, p| acc + (p - mean) * (p - mean).transpose());

    let eigen = scatter.symmetric_eigenvalues();
    let (low, high) = if eigen[0] < eigen[1] {
        (eigen[0], eigen[1])
    } else {
        (eigen[1], eigen[0])
    };

    if high <= 0.0 || low <= high * 1e-15 {
        f64::INFINITY
    } else {
        (high / low).sqrt()
    }
}
