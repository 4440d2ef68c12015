//! Range-based multilateration by nonlinear least squares
//!
//! The solved point minimizes
//! `Σ_a (‖p − anchor_a‖ − measured_a)²`
//! over all anchors. The gradient of this objective is undefined where `p`
//! coincides with an anchor, so a derivative-free simplex search is used.

use crate::algorithms::geometry::{assess_geometry, GeometryAssessment};
use crate::algorithms::simplex::NelderMead;
use crate::core::{
    current_time_ms, AnchorGeometry, Coordinate, FitQuality, MeasurementSet, PositionEstimate,
};
use crate::validation::error::{PositioningError, PositioningResult};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Solver tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Fixed starting point; the anchor centroid when absent
    pub initial_guess: Option<Coordinate>,
    /// Initial simplex edge (meters); 10 % of the anchor extent when absent
    pub initial_step_m: Option<f64>,
    #[serde(flatten)]
    pub termination: NelderMead,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_guess: None,
            initial_step_m: None,
            termination: NelderMead::default(),
        }
    }
}

/// Sum of squared differences between geometric and measured anchor distances
pub fn objective(point: &Vector2<f64>, pairs: &[(Vector2<f64>, f64)]) -> f64 {
    pairs
        .iter()
        .map(|(anchor, measured)| {
            let residual = (point - anchor).norm() - measured;
            residual * residual
        })
        .sum()
}

/// Nonlinear least-squares position solver
#[derive(Debug, Clone, Default)]
pub struct PositionSolver {
    config: SolverConfig,
}

impl PositionSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Starting point used when the caller has none: the configured guess,
    /// otherwise the anchor centroid
    pub fn default_initial_guess(&self, geometry: &AnchorGeometry) -> Coordinate {
        self.config
            .initial_guess
            .unwrap_or_else(|| geometry.centroid())
    }

    /// Solve from the configured (or centroid) starting point
    pub fn solve_default(
        &self,
        measurements: MeasurementSet,
        geometry: &AnchorGeometry,
    ) -> PositioningResult<PositionEstimate> {
        let guess = self.default_initial_guess(geometry);
        self.solve(measurements, geometry, guess)
    }

    /// Find the point whose anchor distances best match `measurements`.
    ///
    /// Reaching the iteration cap is not an error: the best vertex is
    /// returned tagged `FitQuality::BestEffort`.
    pub fn solve(
        &self,
        measurements: MeasurementSet,
        geometry: &AnchorGeometry,
        initial_guess: Coordinate,
    ) -> PositioningResult<PositionEstimate> {
        if !initial_guess.is_finite() {
            return Err(PositioningError::InvalidInput {
                details: format!("initial guess ({}, {})", initial_guess.x, initial_guess.y),
            });
        }

        let pairs = anchor_range_pairs(&measurements, geometry)?;
        let assessment = assess_geometry(geometry);
        if assessment.quality.is_degenerate() {
            warn!(
                quality = ?assessment.quality,
                max_baseline = assessment.max_baseline,
                condition_number = assessment.condition_number,
                "anchor geometry is degenerate, position is ambiguous"
            );
        }

        let step = self.initial_step(&assessment, geometry, &pairs);
        let start = Vector2::new(initial_guess.x, initial_guess.y);
        let minimum = self
            .config
            .termination
            .minimize(|p| objective(p, &pairs), start, step);

        let fit = if minimum.converged {
            FitQuality::Converged
        } else {
            let err = PositioningError::SolverNonconvergence {
                iterations: minimum.iterations,
                residual: minimum.value,
            };
            warn!(error = %err, "returning best-effort position");
            FitQuality::BestEffort
        };

        debug!(
            x = minimum.point.x,
            y = minimum.point.y,
            residual = minimum.value,
            iterations = minimum.iterations,
            evaluations = minimum.evaluations,
            "multilateration finished"
        );

        let rms_residual = (minimum.value / pairs.len() as f64).sqrt();
        Ok(PositionEstimate {
            position: Coordinate::from_vector(&minimum.point),
            measurements,
            residual: minimum.value,
            rms_residual,
            fit,
            geometry: assessment.quality,
            condition_number: assessment.condition_number,
            iterations: minimum.iterations,
            timestamp_ms: current_time_ms(),
        })
    }

    fn initial_step(
        &self,
        assessment: &GeometryAssessment,
        geometry: &AnchorGeometry,
        pairs: &[(Vector2<f64>, f64)],
    ) -> f64 {
        match self.config.initial_step_m {
            Some(step) if step.is_finite() && step > 0.0 => step,
            _ => {
                // Coincident anchors have no extent; fall back to the range scale
                let extent = geometry.extent().max(assessment.max_baseline);
                let mean_range = pairs.iter().map(|(_, r)| r).sum::<f64>() / pairs.len().max(1) as f64;
                (0.1 * extent).max(0.1 * mean_range).max(1e-3)
            }
        }
    }
}

/// Pair every anchor position with its measured range
fn anchor_range_pairs(
    measurements: &MeasurementSet,
    geometry: &AnchorGeometry,
) -> PositioningResult<Vec<(Vector2<f64>, f64)>> {
    let mut pairs = Vec::with_capacity(geometry.len());
    let mut missing = Vec::new();
    for (id, position) in geometry.iter() {
        match measurements.range(id) {
            Some(range) => pairs.push((Vector2::new(position.x, position.y), range.meters())),
            None => missing.push(id.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(PositioningError::IncompleteMeasurement { missing });
    }
    if let Some((extra, _)) = measurements.iter().find(|(id, _)| !geometry.contains(id)) {
        return Err(PositioningError::UnknownAnchor {
            anchor: extra.clone(),
        });
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnchorId, GeometryQuality, RangeEstimate};
    use std::collections::BTreeMap;

    fn rectangle(width: f64, height: f64) -> AnchorGeometry {
        AnchorGeometry::new(vec![
            (AnchorId::from("a1"), Coordinate::new(0.0, 0.0)),
            (AnchorId::from("a2"), Coordinate::new(0.0, height)),
            (AnchorId::from("a3"), Coordinate::new(width, 0.0)),
            (AnchorId::from("a4"), Coordinate::new(width, height)),
        ])
        .unwrap()
    }

    fn exact_ranges(geometry: &AnchorGeometry, target: Coordinate) -> BTreeMap<AnchorId, RangeEstimate> {
        geometry
            .iter()
            .map(|(id, c)| (id.clone(), RangeEstimate::new(c.distance_to(&target)).unwrap()))
            .collect()
    }

    fn measurements(geometry: &AnchorGeometry, ranges: BTreeMap<AnchorId, RangeEstimate>) -> MeasurementSet {
        MeasurementSet::complete(ranges, geometry).unwrap()
    }

    fn precise_solver() -> PositionSolver {
        PositionSolver::new(SolverConfig {
            termination: NelderMead::new(2000, 1e-7, 1e-12),
            ..SolverConfig::default()
        })
    }

    #[test]
    fn test_converges_to_interior_point() {
        let geometry = rectangle(8.0, 7.0);
        let target = Coordinate::new(2.5, 4.0);
        let set = measurements(&geometry, exact_ranges(&geometry, target));

        let estimate = PositionSolver::default()
            .solve(set, &geometry, Coordinate::new(1.0, 1.0))
            .unwrap();

        assert_eq!(estimate.fit, FitQuality::Converged);
        assert_eq!(estimate.geometry, GeometryQuality::Good);
        assert!((estimate.condition_number - 8.0 / 7.0).abs() < 1e-9);
        assert!(estimate.position.distance_to(&target) < 0.01);
        assert!(estimate.residual < 1e-4);
        assert_eq!(estimate.measurements.len(), 4);
    }

    #[test]
    fn test_end_to_end_reference_room() {
        let geometry = rectangle(800.0, 700.0);
        let target = Coordinate::new(400.0, 350.0);
        let set = measurements(&geometry, exact_ranges(&geometry, target));

        let estimate = PositionSolver::default()
            .solve_default(set, &geometry)
            .unwrap();

        assert!(estimate.is_reliable());
        assert!(estimate.position.distance_to(&target) < 1.0);
        assert!(estimate.residual < 1e-3);
        assert!(estimate.rms_residual < 0.05);
    }

    #[test]
    fn test_reference_room_from_fixed_corner_guess() {
        let geometry = rectangle(800.0, 700.0);
        let target = Coordinate::new(410.0, 340.0);
        let set = measurements(&geometry, exact_ranges(&geometry, target));

        let estimate = PositionSolver::default()
            .solve(set, &geometry, Coordinate::new(1.0, 1.0))
            .unwrap();

        assert!(estimate.position.distance_to(&target) < 1.0);
    }

    #[test]
    fn test_perturbation_shifts_continuously_and_raises_residual() {
        let geometry = rectangle(8.0, 7.0);
        let target = Coordinate::new(3.0, 2.0);
        let solver = precise_solver();

        let mut previous_residual = -1.0;
        let mut previous_shift = -1.0;
        for delta in [0.0, 0.05, 0.1, 0.2, 0.4] {
            let mut ranges = exact_ranges(&geometry, target);
            let a4 = AnchorId::from("a4");
            let perturbed = ranges[&a4].meters() + delta;
            ranges.insert(a4, RangeEstimate::new(perturbed).unwrap());

            let estimate = solver
                .solve(measurements(&geometry, ranges), &geometry, target)
                .unwrap();
            let shift = estimate.position.distance_to(&target);

            assert!(estimate.is_converged());
            // No jump: the point moves by at most a small multiple of the perturbation
            assert!(shift <= 2.0 * delta + 1e-6, "delta {} shifted {}", delta, shift);
            assert!(estimate.residual > previous_residual, "delta {}", delta);
            assert!(shift >= previous_shift - 1e-6, "delta {}", delta);
            previous_residual = estimate.residual;
            previous_shift = shift;
        }
    }

    #[test]
    fn test_iteration_cap_yields_best_effort() {
        let geometry = rectangle(800.0, 700.0);
        let target = Coordinate::new(600.0, 100.0);
        let set = measurements(&geometry, exact_ranges(&geometry, target));
        let solver = PositionSolver::new(SolverConfig {
            termination: NelderMead::new(2, 1e-9, 1e-12),
            ..SolverConfig::default()
        });

        let estimate = solver.solve(set, &geometry, Coordinate::new(1.0, 1.0)).unwrap();
        assert_eq!(estimate.fit, FitQuality::BestEffort);
        assert_eq!(estimate.iterations, 2);
        assert!(estimate.position.is_finite());
    }

    #[test]
    fn test_collinear_geometry_does_not_panic() {
        let geometry = AnchorGeometry::new(vec![
            (AnchorId::from("a1"), Coordinate::new(0.0, 0.0)),
            (AnchorId::from("a2"), Coordinate::new(2.0, 0.0)),
            (AnchorId::from("a3"), Coordinate::new(4.0, 0.0)),
            (AnchorId::from("a4"), Coordinate::new(6.0, 0.0)),
        ])
        .unwrap();
        let target = Coordinate::new(3.0, 2.0);
        let set = measurements(&geometry, exact_ranges(&geometry, target));

        let estimate = PositionSolver::default().solve_default(set, &geometry).unwrap();
        assert_eq!(estimate.geometry, GeometryQuality::Collinear);
        assert!(estimate.condition_number.is_infinite());
        assert!(!estimate.is_reliable());
        // Either mirror image fits equally well
        assert!((estimate.position.x - 3.0).abs() < 0.05);
        assert!((estimate.position.y.abs() - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_coincident_geometry_does_not_panic() {
        let geometry = AnchorGeometry::new(vec![
            (AnchorId::from("a1"), Coordinate::new(1.0, 1.0)),
            (AnchorId::from("a2"), Coordinate::new(1.0, 1.0)),
            (AnchorId::from("a3"), Coordinate::new(1.0, 1.0)),
        ])
        .unwrap();
        let ranges = geometry
            .ids()
            .map(|id| (id.clone(), RangeEstimate::new(2.0).unwrap()))
            .collect();
        let set = measurements(&geometry, ranges);

        let estimate = PositionSolver::default().solve_default(set, &geometry).unwrap();
        assert_eq!(estimate.geometry, GeometryQuality::Coincident);
        assert!(estimate.position.is_finite());
        let radius = estimate.position.distance_to(&Coordinate::new(1.0, 1.0));
        assert!((radius - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_mismatched_geometry_rejected() {
        let geometry = rectangle(8.0, 7.0);
        let target = Coordinate::new(2.0, 2.0);
        let set = measurements(&geometry, exact_ranges(&geometry, target));

        let larger = AnchorGeometry::new(vec![
            (AnchorId::from("a1"), Coordinate::new(0.0, 0.0)),
            (AnchorId::from("a2"), Coordinate::new(0.0, 7.0)),
            (AnchorId::from("a3"), Coordinate::new(8.0, 0.0)),
            (AnchorId::from("a4"), Coordinate::new(8.0, 7.0)),
            (AnchorId::from("a5"), Coordinate::new(4.0, 9.0)),
        ])
        .unwrap();

        match PositionSolver::default().solve_default(set, &larger) {
            Err(PositioningError::IncompleteMeasurement { missing }) => {
                assert_eq!(missing, vec![AnchorId::from("a5")]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_initial_guess_rejected() {
        let geometry = rectangle(8.0, 7.0);
        let set = measurements(&geometry, exact_ranges(&geometry, Coordinate::new(1.0, 1.0)));
        let result = PositionSolver::default().solve(set, &geometry, Coordinate::new(f64::NAN, 0.0));
        assert!(matches!(result, Err(PositioningError::InvalidInput { .. })));
    }

    #[test]
    fn test_partial_solver_config_keeps_termination_defaults() {
        let config: SolverConfig =
            serde_json::from_str(r#"{"initial_guess": {"x": 1.0, "y": 1.0}}"#).unwrap();
        assert_eq!(config.initial_guess, Some(Coordinate::new(1.0, 1.0)));
        assert_eq!(config.initial_step_m, None);
        assert_eq!(config.termination, NelderMead::default());

        let config: SolverConfig = serde_json::from_str(r#"{"max_iterations": 50}"#).unwrap();
        assert_eq!(config.termination.max_iterations, 50);
        assert_eq!(config.termination.xatol, NelderMead::default().xatol);
    }

    #[test]
    fn test_objective_zero_at_true_point() {
        let pairs = vec![
            (Vector2::new(0.0, 0.0), 5.0),
            (Vector2::new(6.0, 0.0), 5.0),
        ];
        assert!(objective(&Vector2::new(3.0, 4.0), &pairs).abs() < 1e-12);
        assert!((objective(&Vector2::new(0.0, 0.0), &pairs) - (25.0 + 1.0)).abs() < 1e-12);
    }
}
