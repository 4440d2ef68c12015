//! Nelder-Mead downhill simplex minimizer for planar objectives

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Termination settings of the simplex search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMead {
    /// Maximum number of iterations before giving up
    pub max_iterations: usize,
    /// Absolute tolerance on the spread of simplex vertices
    pub xatol: f64,
    /// Absolute tolerance on the spread of objective values
    pub fatol: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            xatol: 1e-4,
            fatol: 1e-4,
        }
    }
}

/// Best vertex found by a simplex search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub point: Vector2<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// Both tolerances were met before the iteration cap
    pub converged: bool,
}

struct Simplex<F> {
    objective: F,
    vertices: [Vector2<f64>; 3],
    values: [f64; 3],
    evaluations: usize,
}

impl<F: Fn(&Vector2<f64>) -> f64> Simplex<F> {
    fn evaluate(&mut self, point: &Vector2<f64>) -> f64 {
        self.evaluations += 1;
        let value = (self.objective)(point);
        // NaN would poison the ordering; treat it as uphill
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }

    fn sort(&mut self) {
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| {
            self.values[a]
                .partial_cmp(&self.values[b])
                .unwrap_or(Ordering::Equal)
        });
        self.vertices = order.map(|i| self.vertices[i]);
        self.values = order.map(|i| self.values[i]);
    }

    fn within_tolerance(&self, xatol: f64, fatol: f64) -> bool {
        let best = self.vertices[0];
        let x_spread = self.vertices[1..]
            .iter()
            .map(|v| (v - best).abs().max())
            .fold(0.0, f64::max);
        let f_spread = self.values[1..]
            .iter()
            .map(|f| (f - self.values[0]).abs())
            .fold(0.0, f64::max);
        x_spread <= xatol && f_spread <= fatol
    }

    /// One Nelder-Mead step on a sorted simplex
    fn step(&mut self) {
        let worst = self.vertices[2];
        let centroid = (self.vertices[0] + self.vertices[1]) / 2.0;

        let reflected = centroid * (1.0 + REFLECTION) - worst * REFLECTION;
        let f_reflected = self.evaluate(&reflected);

        if f_reflected < self.values[0] {
            let expanded =
                centroid * (1.0 + REFLECTION * EXPANSION) - worst * (REFLECTION * EXPANSION);
            let f_expanded = self.evaluate(&expanded);
            if f_expanded < f_reflected {
                self.replace_worst(expanded, f_expanded);
            } else {
                self.replace_worst(reflected, f_reflected);
            }
            return;
        }

        if f_reflected < self.values[1] {
            self.replace_worst(reflected, f_reflected);
            return;
        }

        if f_reflected < self.values[2] {
            let outside = centroid * (1.0 + CONTRACTION * REFLECTION)
                - worst * (CONTRACTION * REFLECTION);
            let f_outside = self.evaluate(&outside);
            if f_outside <= f_reflected {
                self.replace_worst(outside, f_outside);
                return;
            }
        } else {
            let inside = centroid * (1.0 - CONTRACTION) + worst * CONTRACTION;
            let f_inside = self.evaluate(&inside);
            if f_inside < self.values[2] {
                self.replace_worst(inside, f_inside);
                return;
            }
        }

        self.shrink();
    }

    fn replace_worst(&mut self, point: Vector2<f64>, value: f64) {
        self.vertices[2] = point;
        self.values[2] = value;
    }

    fn shrink(&mut self) {
        let best = self.vertices[0];
        for i in 1..3 {
            let point = best + (self.vertices[i] - best) * SHRINK;
            self.vertices[i] = point;
            self.values[i] = self.evaluate(&point);
        }
    }
}

impl NelderMead {
    pub fn new(max_iterations: usize, xatol: f64, fatol: f64) -> Self {
        Self {
            max_iterations,
            xatol,
            fatol,
        }
    }

    /// Minimize `objective` starting from a simplex spanned by `start` and
    /// `start + step` along each axis.
    pub fn minimize<F>(&self, objective: F, start: Vector2<f64>, step: f64) -> Minimum
    where
        F: Fn(&Vector2<f64>) -> f64,
    {
        let step = if step.is_finite() && step > 0.0 { step } else { 1.0 };
        let mut simplex = Simplex {
            objective,
            vertices: [
                start,
                start + Vector2::new(step, 0.0),
                start + Vector2::new(0.0, step),
            ],
            values: [0.0; 3],
            evaluations: 0,
        };
        for i in 0..3 {
            let vertex = simplex.vertices[i];
            simplex.values[i] = simplex.evaluate(&vertex);
        }
        simplex.sort();

        let mut iterations = 0;
        let mut converged = simplex.within_tolerance(self.xatol, self.fatol);
        while !converged && iterations < self.max_iterations {
            simplex.step();
            simplex.sort();
            iterations += 1;
            converged = simplex.within_tolerance(self.xatol, self.fatol);
        }

        Minimum {
            point: simplex.vertices[0],
            value: simplex.values[0],
            iterations,
            evaluations: simplex.evaluations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let target = Vector2::new(3.0, -2.0);
        let result = NelderMead::new(500, 1e-8, 1e-12)
            .minimize(|p| (p - target).norm_squared(), Vector2::zeros(), 1.0);

        assert!(result.converged);
        assert!((result.point - target).norm() < 1e-6);
        assert!(result.value < 1e-10);
    }

    #[test]
    fn test_rosenbrock_valley() {
        let rosenbrock = |p: &Vector2<f64>| (1.0 - p.x).powi(2) + 100.0 * (p.y - p.x * p.x).powi(2);
        let result = NelderMead::new(2000, 1e-8, 1e-12).minimize(rosenbrock, Vector2::new(-1.2, 1.0), 0.1);

        assert!(result.converged);
        assert!((result.point - Vector2::new(1.0, 1.0)).norm() < 1e-4);
    }

    #[test]
    fn test_iteration_cap_returns_best_vertex() {
        let target = Vector2::new(100.0, 100.0);
        let objective = |p: &Vector2<f64>| (p - target).norm_squared();
        let start = Vector2::zeros();
        let result = NelderMead::new(3, 1e-12, 1e-12).minimize(objective, start, 0.5);

        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
        // Still moved downhill from the start
        assert!(result.value < objective(&start));
    }

    #[test]
    fn test_nan_objective_is_treated_as_uphill() {
        let objective = |p: &Vector2<f64>| {
            if p.x < 0.0 {
                f64::NAN
            } else {
                (p.x - 1.0).powi(2) + p.y.powi(2)
            }
        };
        let result = NelderMead::default().minimize(objective, Vector2::new(0.5, 0.5), 0.25);
        assert!(result.value.is_finite());
        assert!((result.point - Vector2::new(1.0, 0.0)).norm() < 1e-2);
    }
}
