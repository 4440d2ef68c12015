//! Types shared between the scheduler and its consumers

use crate::core::{AnchorGeometry, AnchorId, Coordinate, PositionEstimate};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemState {
    /// Cycles started
    pub cycles_run: u64,
    /// Estimates published
    pub estimates_published: u64,
    /// Published estimates that hit the iteration cap
    pub best_effort_estimates: u64,
    /// Cycles that ended without an estimate
    pub cycles_failed: u64,
    /// Reports dropped by the collector (unknown, duplicate, malformed, stale)
    pub rejected_reports: u64,
    /// Last successful publish (milliseconds since epoch)
    pub last_publish_time: Option<u64>,
    pub last_error: Option<String>,
    /// Scheduler uptime (milliseconds)
    pub uptime_ms: u64,
}

/// Anchor marker for the renderer overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorMarker {
    pub id: AnchorId,
    pub position: Coordinate,
}

/// Read side of the estimate publication.
///
/// Clones share the same slot. Readers only ever see a complete estimate;
/// each publish swaps in a new `Arc` and the previous one is dropped once no
/// reader holds it.
#[derive(Debug, Clone)]
pub struct EstimateHandle {
    latest: Arc<RwLock<Option<Arc<PositionEstimate>>>>,
    geometry: Arc<AnchorGeometry>,
}

impl EstimateHandle {
    pub fn new(geometry: Arc<AnchorGeometry>) -> Self {
        Self {
            latest: Arc::new(RwLock::new(None)),
            geometry,
        }
    }

    /// Most recent estimate, if any cycle has succeeded yet
    pub fn latest_estimate(&self) -> Option<Arc<PositionEstimate>> {
        match self.latest.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Anchor ids and coordinates to draw
    pub fn anchors(&self) -> Vec<AnchorMarker> {
        self.geometry
            .iter()
            .map(|(id, position)| AnchorMarker {
                id: id.clone(),
                position: *position,
            })
            .collect()
    }

    pub fn geometry(&self) -> &Arc<AnchorGeometry> {
        &self.geometry
    }

    /// Replace the published estimate
    pub(crate) fn publish(&self, estimate: Arc<PositionEstimate>) {
        let mut slot = match self.latest.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(estimate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FitQuality, GeometryQuality, MeasurementSet, RangeEstimate};
    use std::collections::BTreeMap;

    fn geometry() -> Arc<AnchorGeometry> {
        Arc::new(
            AnchorGeometry::new(vec![
                (AnchorId::from("a1"), Coordinate::new(0.0, 0.0)),
                (AnchorId::from("a2"), Coordinate::new(0.0, 7.0)),
                (AnchorId::from("a3"), Coordinate::new(8.0, 0.0)),
            ])
            .unwrap(),
        )
    }

    fn estimate(geometry: &AnchorGeometry, x: f64) -> PositionEstimate {
        let ranges: BTreeMap<_, _> = geometry
            .ids()
            .map(|id| (id.clone(), RangeEstimate::new(1.0).unwrap()))
            .collect();
        PositionEstimate {
            position: Coordinate::new(x, 1.0),
            measurements: MeasurementSet::complete(ranges, geometry).unwrap(),
            residual: 0.0,
            rms_residual: 0.0,
            fit: FitQuality::Converged,
            geometry: GeometryQuality::Good,
            condition_number: 1.2,
            iterations: 10,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_handle_starts_empty() {
        let handle = EstimateHandle::new(geometry());
        assert!(handle.latest_estimate().is_none());
        assert_eq!(handle.anchors().len(), 3);
        assert_eq!(handle.anchors()[1].position, Coordinate::new(0.0, 7.0));
    }

    #[test]
    fn test_publish_replaces_and_keeps_old_snapshot_alive() {
        let geometry = geometry();
        let handle = EstimateHandle::new(geometry.clone());
        let reader = handle.clone();

        handle.publish(Arc::new(estimate(&geometry, 1.0)));
        let first = reader.latest_estimate().unwrap();

        handle.publish(Arc::new(estimate(&geometry, 2.0)));
        let second = reader.latest_estimate().unwrap();

        // A reader holding the old snapshot still sees it intact
        assert_eq!(first.position.x, 1.0);
        assert_eq!(second.position.x, 2.0);
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
