//! Measurement collection over the rendezvous endpoint
//!
//! One collection round assembles a complete [`MeasurementSet`]: the local
//! anchor's range is seeded up front and every remote anchor must report
//! exactly one record before the deadline. Reports are attributed by the
//! sender's network identity through a configured table, never by arrival
//! order. Reports still waiting when a round closes are dropped, so no range
//! outlives the round it was sent for.

use crate::core::{AnchorGeometry, AnchorId, MeasurementSet, RangeEstimate};
use crate::hardware::{is_connection_error, IncomingReport, ReportChannel};
use crate::processing::parser::parse_range;
use crate::validation::error::{PositioningError, PositioningResult};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Counters of what the collector accepted and rejected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub rounds_started: u64,
    pub rounds_completed: u64,
    pub rounds_incomplete: u64,
    pub reports_accepted: u64,
    pub unknown_identity: u64,
    pub duplicate_reports: u64,
    pub malformed_records: u64,
    /// Reports left waiting when a round closed
    pub stale_reports: u64,
    /// Sender connections that failed before delivering anything
    pub connection_errors: u64,
}

impl CollectorStats {
    /// Reports dropped for any reason
    pub fn rejected_reports(&self) -> u64 {
        self.unknown_identity + self.duplicate_reports + self.malformed_records + self.stale_reports
    }
}

/// Assembles one range per anchor from reports arriving on a channel
pub struct MeasurementCollector {
    channel: Box<dyn ReportChannel + Send>,
    local: AnchorId,
    identities: HashMap<IpAddr, AnchorId>,
    geometry: Arc<AnchorGeometry>,
    stats: CollectorStats,
}

impl MeasurementCollector {
    /// Create a collector.
    ///
    /// `identities` maps sender addresses to remote anchors. The local anchor
    /// never reports over the network; an entry for it is accepted but will
    /// always be treated as a duplicate.
    pub fn new(
        channel: Box<dyn ReportChannel + Send>,
        local: AnchorId,
        identities: HashMap<IpAddr, AnchorId>,
        geometry: Arc<AnchorGeometry>,
    ) -> PositioningResult<Self> {
        if !geometry.contains(&local) {
            return Err(PositioningError::UnknownAnchor { anchor: local });
        }
        if let Some(anchor) = identities.values().find(|id| !geometry.contains(id)) {
            return Err(PositioningError::UnknownAnchor {
                anchor: anchor.clone(),
            });
        }

        Ok(Self {
            channel,
            local,
            identities,
            geometry,
            stats: CollectorStats::default(),
        })
    }

    pub fn local_anchor(&self) -> &AnchorId {
        &self.local
    }

    pub fn geometry(&self) -> &Arc<AnchorGeometry> {
        &self.geometry
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    pub fn describe_channel(&self) -> String {
        self.channel.describe()
    }

    /// Run one collection round.
    ///
    /// Returns as soon as every anchor has a range. When `timeout` elapses
    /// first the partial table is discarded and the missing anchors are
    /// named in the error. Either way, reports already waiting on the channel
    /// are dropped before returning. A failed sender connection is skipped;
    /// only an endpoint failure ends the round early.
    pub fn collect(
        &mut self,
        local_estimate: RangeEstimate,
        timeout: Duration,
    ) -> PositioningResult<MeasurementSet> {
        self.stats.rounds_started += 1;
        let deadline = Instant::now() + timeout;

        let mut slots: BTreeMap<AnchorId, Option<RangeEstimate>> =
            self.geometry.ids().map(|id| (id.clone(), None)).collect();
        slots.insert(self.local.clone(), Some(local_estimate));

        while slots.values().any(Option::is_none) {
            if Instant::now() >= deadline {
                break;
            }
            let report = match self.channel.next_report(deadline) {
                Ok(Some(report)) => report,
                Ok(None) => break,
                Err(e) if is_connection_error(e.kind()) => {
                    self.stats.connection_errors += 1;
                    warn!(error = %e, "sender connection failed");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Err(err) = self.accept(report, &mut slots) {
                warn!(error = %err, "dropping report");
            }
        }
        self.discard_stale();

        let missing: Vec<AnchorId> = slots
            .iter()
            .filter(|(_, range)| range.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        if !missing.is_empty() {
            self.stats.rounds_incomplete += 1;
            return Err(PositioningError::IncompleteMeasurement { missing });
        }

        let ranges = slots
            .into_iter()
            .filter_map(|(id, range)| range.map(|r| (id, r)))
            .collect();
        let set = MeasurementSet::complete(ranges, &self.geometry)?;
        self.stats.rounds_completed += 1;
        Ok(set)
    }

    /// Drop reports that arrived for a round that is already closed
    fn discard_stale(&mut self) {
        match self.channel.discard_pending() {
            Ok(0) => {}
            Ok(dropped) => {
                self.stats.stale_reports += dropped as u64;
                debug!(dropped, "dropped reports left over from the closed round");
            }
            Err(e) => warn!(error = %e, "could not drain pending reports"),
        }
    }

    /// Attribute one report to its slot
    fn accept(
        &mut self,
        report: IncomingReport,
        slots: &mut BTreeMap<AnchorId, Option<RangeEstimate>>,
    ) -> PositioningResult<()> {
        let peer = report.peer;
        let anchor = match self.identities.get(&peer) {
            Some(anchor) => anchor.clone(),
            None => {
                self.stats.unknown_identity += 1;
                return Err(PositioningError::UnknownIdentity { peer });
            }
        };

        let slot = match slots.get_mut(&anchor) {
            Some(slot) => slot,
            None => {
                self.stats.unknown_identity += 1;
                return Err(PositioningError::UnknownAnchor { anchor });
            }
        };
        if slot.is_some() {
            self.stats.duplicate_reports += 1;
            return Err(PositioningError::DuplicateReport { anchor, peer });
        }

        let range = parse_range(&report.payload).map_err(|e| {
            self.stats.malformed_records += 1;
            PositioningError::MalformedRecord {
                peer,
                reason: e.to_string(),
            }
        })?;

        debug!(%anchor, %peer, meters = range.meters(), "range report accepted");
        *slot = Some(range);
        self.stats.reports_accepted += 1;
        Ok(())
    }
}
