//! Core data types for the positioning pipeline

use crate::utils::config::ConfigError;
use crate::validation::error::{PositioningError, PositioningResult};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a fixed measurement station
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Planar coordinate in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_point(self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        nalgebra::distance(&self.to_point(), &other.to_point())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Fixed anchor coordinates, established once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorGeometry {
    anchors: BTreeMap<AnchorId, Coordinate>,
}

impl AnchorGeometry {
    /// Build the geometry table. Ids must be unique and coordinates finite.
    pub fn new<I>(anchors: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (AnchorId, Coordinate)>,
    {
        let mut table = BTreeMap::new();
        for (id, position) in anchors {
            if !position.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    parameter: format!("anchors.{}.position", id),
                    value: format!("({}, {})", position.x, position.y),
                    reason: "coordinates must be finite".to_string(),
                });
            }
            if table.insert(id.clone(), position).is_some() {
                return Err(ConfigError::AnchorConflict {
                    anchor_id: id,
                    reason: "anchor id listed more than once".to_string(),
                });
            }
        }

        if table.is_empty() {
            return Err(ConfigError::MissingParameter {
                parameter: "anchors".to_string(),
            });
        }

        Ok(Self { anchors: table })
    }

    pub fn position(&self, id: &AnchorId) -> Option<Coordinate> {
        self.anchors.get(id).copied()
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.anchors.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &AnchorId> {
        self.anchors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnchorId, &Coordinate)> {
        self.anchors.iter()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Arithmetic mean of all anchor coordinates
    pub fn centroid(&self) -> Coordinate {
        let n = self.anchors.len().max(1) as f64;
        let (sx, sy) = self
            .anchors
            .values()
            .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
        Coordinate::new(sx / n, sy / n)
    }

    /// Diagonal of the axis-aligned bounding box around all anchors
    pub fn extent(&self) -> f64 {
        let mut min = Vector2::repeat(f64::INFINITY);
        let mut max = Vector2::repeat(f64::NEG_INFINITY);
        for c in self.anchors.values() {
            min = min.inf(&Vector2::new(c.x, c.y));
            max = max.sup(&Vector2::new(c.x, c.y));
        }
        (max - min).norm()
    }
}

/// One signal strength reading taken at an anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssiSample {
    pub anchor: AnchorId,
    pub rssi_dbm: i32,
}

/// Non-negative, finite distance estimate in meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RangeEstimate(f64);

impl RangeEstimate {
    pub fn new(meters: f64) -> Option<Self> {
        if meters.is_finite() && meters >= 0.0 {
            Some(Self(meters))
        } else {
            None
        }
    }

    pub fn meters(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for RangeEstimate {
    type Error = String;

    fn try_from(meters: f64) -> Result<Self, Self::Error> {
        Self::new(meters).ok_or_else(|| format!("invalid range {} m", meters))
    }
}

impl From<RangeEstimate> for f64 {
    fn from(range: RangeEstimate) -> Self {
        range.0
    }
}

/// One range per anchor of the geometry, nothing missing and nothing extra
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSet {
    ranges: BTreeMap<AnchorId, RangeEstimate>,
}

impl MeasurementSet {
    /// Accept `ranges` only if it covers exactly the anchors of `geometry`.
    pub fn complete(
        ranges: BTreeMap<AnchorId, RangeEstimate>,
        geometry: &AnchorGeometry,
    ) -> PositioningResult<Self> {
        if let Some(extra) = ranges.keys().find(|id| !geometry.contains(id)) {
            return Err(PositioningError::UnknownAnchor {
                anchor: extra.clone(),
            });
        }

        let missing: Vec<AnchorId> = geometry
            .ids()
            .filter(|id| !ranges.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PositioningError::IncompleteMeasurement { missing });
        }

        Ok(Self { ranges })
    }

    pub fn range(&self, id: &AnchorId) -> Option<RangeEstimate> {
        self.ranges.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnchorId, &RangeEstimate)> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether this set covers exactly the anchors of `geometry`
    pub fn matches(&self, geometry: &AnchorGeometry) -> bool {
        self.ranges.len() == geometry.len() && geometry.ids().all(|id| self.ranges.contains_key(id))
    }
}

/// How the optimizer terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitQuality {
    /// Simplex met both the parameter and function-value tolerances
    Converged,
    /// Iteration cap reached; best vertex found so far
    BestEffort,
}

/// Anchor layout assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryQuality {
    /// Anchors span the plane
    Good,
    /// Anchors lie on one line; the fit is mirror-ambiguous across it
    Collinear,
    /// Anchors share a single location; only the radius is observable
    Coincident,
}

impl GeometryQuality {
    pub fn is_degenerate(&self) -> bool {
        !matches!(self, GeometryQuality::Good)
    }
}

/// Instantaneous position estimate handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionEstimate {
    /// Solved position (meters)
    pub position: Coordinate,
    /// Complete measurement set the position was derived from
    pub measurements: MeasurementSet,
    /// Sum of squared range residuals at `position` (m²)
    pub residual: f64,
    /// Root-mean-square range residual (m)
    pub rms_residual: f64,
    pub fit: FitQuality,
    pub geometry: GeometryQuality,
    /// Spread ratio of the anchor layout; infinite for degenerate layouts
    pub condition_number: f64,
    /// Optimizer iterations spent
    pub iterations: usize,
    /// Wall-clock time the estimate was computed (milliseconds since epoch)
    pub timestamp_ms: u64,
}

impl PositionEstimate {
    pub fn is_converged(&self) -> bool {
        self.fit == FitQuality::Converged
    }

    /// Converged on a non-degenerate layout
    pub fn is_reliable(&self) -> bool {
        self.is_converged() && !self.geometry.is_degenerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> AnchorGeometry {
        AnchorGeometry::new(vec![
            (AnchorId::from("a"), Coordinate::new(0.0, 0.0)),
            (AnchorId::from("b"), Coordinate::new(0.0, 4.0)),
            (AnchorId::from("c"), Coordinate::new(4.0, 0.0)),
            (AnchorId::from("d"), Coordinate::new(4.0, 4.0)),
        ])
        .unwrap()
    }

    fn range(m: f64) -> RangeEstimate {
        RangeEstimate::new(m).unwrap()
    }

    #[test]
    fn test_range_estimate_rejects_invalid() {
        assert!(RangeEstimate::new(0.0).is_some());
        assert!(RangeEstimate::new(-0.5).is_none());
        assert!(RangeEstimate::new(f64::NAN).is_none());
        assert!(RangeEstimate::new(f64::INFINITY).is_none());
    }

    #[test]
    fn test_geometry_rejects_duplicate_ids() {
        let result = AnchorGeometry::new(vec![
            (AnchorId::from("a"), Coordinate::new(0.0, 0.0)),
            (AnchorId::from("a"), Coordinate::new(1.0, 0.0)),
        ]);
        assert!(matches!(result, Err(ConfigError::AnchorConflict { .. })));
    }

    #[test]
    fn test_geometry_centroid_and_extent() {
        let geometry = square();
        assert_eq!(geometry.centroid(), Coordinate::new(2.0, 2.0));
        assert!((geometry.extent() - 32f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_measurement_set_requires_every_anchor() {
        let geometry = square();
        let mut ranges = BTreeMap::new();
        ranges.insert(AnchorId::from("a"), range(1.0));
        ranges.insert(AnchorId::from("b"), range(2.0));
        ranges.insert(AnchorId::from("c"), range(3.0));

        match MeasurementSet::complete(ranges.clone(), &geometry) {
            Err(PositioningError::IncompleteMeasurement { missing }) => {
                assert_eq!(missing, vec![AnchorId::from("d")]);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        ranges.insert(AnchorId::from("d"), range(4.0));
        let set = MeasurementSet::complete(ranges, &geometry).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.matches(&geometry));
    }

    #[test]
    fn test_measurement_set_rejects_foreign_anchor() {
        let geometry = square();
        let mut ranges: BTreeMap<AnchorId, RangeEstimate> = geometry
            .ids()
            .map(|id| (id.clone(), range(1.0)))
            .collect();
        ranges.insert(AnchorId::from("z"), range(1.0));

        let result = MeasurementSet::complete(ranges, &geometry);
        assert!(matches!(result, Err(PositioningError::UnknownAnchor { .. })));
    }
}
