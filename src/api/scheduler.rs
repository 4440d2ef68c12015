//! Periodic positioning cycles
//!
//! Each cycle reads the local RSSI, converts it to a range, collects the
//! remote anchors' ranges and solves for the position. A successful cycle
//! replaces the published estimate; a failed one is logged and leaves the
//! previous estimate in place. Cycles never overlap.

use crate::algorithms::multilateration::PositionSolver;
use crate::algorithms::range_model::RangeModel;
use crate::api::types::{EstimateHandle, SystemState};
use crate::core::{current_time_ms, PositionEstimate, RangeEstimate};
use crate::hardware::{ReportChannel, SignalSource};
use crate::processing::collector::MeasurementCollector;
use crate::utils::config::SystemConfig;
use crate::validation::error::{PositioningError, PositioningResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest single sleep between stop-flag checks
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives the measure → collect → solve pipeline
pub struct CycleScheduler {
    signal: Box<dyn SignalSource + Send>,
    model: RangeModel,
    collector: MeasurementCollector,
    solver: PositionSolver,
    handle: EstimateHandle,
    period: Duration,
    collection_timeout: Duration,
    state: SystemState,
    start_time: Instant,
}

impl CycleScheduler {
    pub fn new(
        signal: Box<dyn SignalSource + Send>,
        model: RangeModel,
        collector: MeasurementCollector,
        solver: PositionSolver,
        period: Duration,
        collection_timeout: Duration,
    ) -> Self {
        let handle = EstimateHandle::new(collector.geometry().clone());
        Self {
            signal,
            model,
            collector,
            solver,
            handle,
            period,
            collection_timeout,
            state: SystemState::default(),
            start_time: Instant::now(),
        }
    }

    /// Wire up a scheduler from a validated configuration
    pub fn from_config(
        config: &SystemConfig,
        channel: Box<dyn ReportChannel + Send>,
        signal: Box<dyn SignalSource + Send>,
    ) -> PositioningResult<Self> {
        config.validate().into_result()?;
        let geometry = Arc::new(config.geometry()?);
        let collector = MeasurementCollector::new(
            channel,
            config.local_anchor.clone(),
            config.identity_table(),
            geometry,
        )?;

        Ok(Self::new(
            signal,
            config.range_model(),
            collector,
            PositionSolver::new(config.solver),
            config.cycle_period(),
            config.collection_timeout(),
        ))
    }

    /// Handle through which the latest estimate can be read
    pub fn handle(&self) -> EstimateHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn collector(&self) -> &MeasurementCollector {
        &self.collector
    }

    /// Run one cycle and publish its estimate.
    ///
    /// Failures are logged and counted here; the previously published
    /// estimate stays in place.
    pub fn run_cycle(&mut self) -> PositioningResult<Arc<PositionEstimate>> {
        self.state.cycles_run += 1;
        let cycle = self.state.cycles_run;

        let result = self.measure_and_solve();
        self.state.rejected_reports = self.collector.stats().rejected_reports();
        self.state.uptime_ms = self.start_time.elapsed().as_millis() as u64;

        match result {
            Ok(estimate) => {
                let estimate = Arc::new(estimate);
                self.handle.publish(estimate.clone());
                self.state.estimates_published += 1;
                if !estimate.is_converged() {
                    self.state.best_effort_estimates += 1;
                }
                self.state.last_publish_time = Some(current_time_ms());
                info!(
                    cycle,
                    x = estimate.position.x,
                    y = estimate.position.y,
                    rms_residual = estimate.rms_residual,
                    fit = ?estimate.fit,
                    "position estimate published"
                );
                Ok(estimate)
            }
            Err(err) => {
                self.state.cycles_failed += 1;
                self.state.last_error = Some(err.to_string());
                warn!(cycle, error = %err, severity = ?err.severity(), "cycle skipped, keeping previous estimate");
                Err(err)
            }
        }
    }

    fn measure_and_solve(&mut self) -> PositioningResult<PositionEstimate> {
        let rssi = self.signal.read_rssi()?;
        let meters = self.model.distance(rssi);
        let local_anchor = self.collector.local_anchor().clone();
        let local_range = RangeEstimate::new(meters).ok_or_else(|| PositioningError::InvalidRange {
            anchor: local_anchor.clone(),
            value: meters,
        })?;
        debug!(anchor = %local_anchor, rssi, meters, "local range");

        let measurements = self.collector.collect(local_range, self.collection_timeout)?;
        let geometry = self.collector.geometry().clone();
        self.solver.solve_default(measurements, &geometry)
    }

    /// Run cycles every period until `max_cycles` have run or `stop` is set.
    ///
    /// The period is measured from the start of one cycle to the start of
    /// the next; a cycle that overruns is followed immediately by the next.
    pub fn run(&mut self, max_cycles: Option<u64>, stop: &AtomicBool) -> SystemState {
        let mut completed = 0u64;
        loop {
            if stop.load(Ordering::Relaxed) {
                info!(completed, "stop requested");
                break;
            }

            let started = Instant::now();
            // Logged and counted inside
            let _ = self.run_cycle();
            completed += 1;

            if max_cycles.map_or(false, |max| completed >= max) {
                break;
            }
            self.sleep_until(started + self.period, stop);
        }
        self.state.clone()
    }

    fn sleep_until(&self, next_start: Instant, stop: &AtomicBool) {
        loop {
            let now = Instant::now();
            if now >= next_start || stop.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep((next_start - now).min(STOP_POLL_INTERVAL));
        }
    }
}
