//! In-memory report channel and signal source for testing and simulation

use crate::core::{RangeEstimate, RECORD_LEN};
use crate::hardware::{IncomingReport, ReportChannel, SignalError, SignalResult, SignalSource};
use crate::processing::parser::encode_record;
use rand::Rng;
use std::collections::VecDeque;
use std::io;
use std::net::IpAddr;
use std::time::Instant;

/// Queued arrival on the mock channel
#[derive(Debug)]
enum Arrival {
    Report(IncomingReport),
    /// Everything behind this arrives after the current round has closed
    RoundEnd,
}

/// Report channel fed from a queue instead of a socket
///
/// An empty queue behaves like a silent network: the next call reports that
/// the deadline passed. So does a round marker, until `discard_pending`
/// drains it.
#[derive(Debug, Default)]
pub struct MockReportChannel {
    queue: VecDeque<Arrival>,
    delivered: usize,
    discarded: usize,
    fail_next: Option<io::ErrorKind>,
}

impl MockReportChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a well-formed record from `peer`
    pub fn push_range(&mut self, peer: IpAddr, meters: f64) {
        let payload = match RangeEstimate::new(meters) {
            Some(range) => encode_record(range).to_vec(),
            None => (meters as f32).to_be_bytes().to_vec(),
        };
        self.push_raw(peer, payload);
    }

    /// Queue an arbitrary payload from `peer`
    pub fn push_raw(&mut self, peer: IpAddr, payload: Vec<u8>) {
        self.queue.push_back(Arrival::Report(IncomingReport::new(peer, payload)));
    }

    /// Reports queued after this call belong to the next round
    pub fn end_round(&mut self) {
        self.queue.push_back(Arrival::RoundEnd);
    }

    /// Make the next call fail with the given error
    pub fn fail_next(&mut self, kind: io::ErrorKind) {
        self.fail_next = Some(kind);
    }

    pub fn queued_report_count(&self) -> usize {
        self.queue
            .iter()
            .filter(|arrival| matches!(arrival, Arrival::Report(_)))
            .count()
    }

    pub fn delivered_report_count(&self) -> usize {
        self.delivered
    }

    pub fn discarded_report_count(&self) -> usize {
        self.discarded
    }
}

impl ReportChannel for MockReportChannel {
    fn next_report(&mut self, _deadline: Instant) -> io::Result<Option<IncomingReport>> {
        if let Some(kind) = self.fail_next.take() {
            return Err(io::Error::new(kind, "simulated endpoint failure"));
        }

        match self.queue.pop_front() {
            Some(Arrival::Report(report)) => {
                self.delivered += 1;
                Ok(Some(report))
            }
            Some(Arrival::RoundEnd) => {
                // Stays in place until the round is drained
                self.queue.push_front(Arrival::RoundEnd);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn discard_pending(&mut self) -> io::Result<usize> {
        let mut dropped = 0;
        while let Some(arrival) = self.queue.pop_front() {
            match arrival {
                Arrival::Report(_) => dropped += 1,
                Arrival::RoundEnd => break,
            }
        }
        self.discarded += dropped;
        Ok(dropped)
    }

    fn describe(&self) -> String {
        format!("mock ({} queued)", self.queued_report_count())
    }
}

/// Signal source replaying scripted readings, optionally jittered
#[derive(Debug)]
pub struct MockSignalSource {
    interface: String,
    readings: VecDeque<i32>,
    steady: Option<i32>,
    jitter_dbm: i32,
}

impl MockSignalSource {
    /// Source that returns `rssi_dbm` on every read
    pub fn steady(rssi_dbm: i32) -> Self {
        Self {
            interface: "mock0".to_string(),
            readings: VecDeque::new(),
            steady: Some(rssi_dbm),
            jitter_dbm: 0,
        }
    }

    /// Source that returns each of `readings` once, then fails
    pub fn scripted(readings: impl IntoIterator<Item = i32>) -> Self {
        Self {
            interface: "mock0".to_string(),
            readings: readings.into_iter().collect(),
            steady: None,
            jitter_dbm: 0,
        }
    }

    /// Add uniform noise of up to ±`jitter_dbm` to every reading
    pub fn with_jitter(mut self, jitter_dbm: i32) -> Self {
        self.jitter_dbm = jitter_dbm.abs();
        self
    }
}

impl SignalSource for MockSignalSource {
    fn read_rssi(&mut self) -> SignalResult<i32> {
        let base = match self.readings.pop_front().or(self.steady) {
            Some(rssi) => rssi,
            None => {
                return Err(SignalError::Exhausted {
                    interface: self.interface.clone(),
                })
            }
        };

        if self.jitter_dbm == 0 {
            return Ok(base);
        }
        let mut rng = rand::thread_rng();
        Ok(base + rng.gen_range(-self.jitter_dbm..=self.jitter_dbm))
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_mock_channel_drains_in_order() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let mut channel = MockReportChannel::new();
        channel.push_range(peer, 1.0);
        channel.push_raw(peer, vec![1, 2]);

        let first = channel.next_report(Instant::now()).unwrap().unwrap();
        assert_eq!(first.payload.len(), RECORD_LEN);
        let second = channel.next_report(Instant::now()).unwrap().unwrap();
        assert_eq!(second.payload, vec![1, 2]);
        assert!(channel.next_report(Instant::now()).unwrap().is_none());
        assert_eq!(channel.delivered_report_count(), 2);
    }

    #[test]
    fn test_round_end_holds_back_later_reports() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let mut channel = MockReportChannel::new();
        channel.push_range(peer, 1.0);
        channel.push_range(peer, 2.0);
        channel.end_round();
        channel.push_range(peer, 3.0);

        assert!(channel.next_report(Instant::now()).unwrap().is_some());
        assert_eq!(channel.discard_pending().unwrap(), 1);

        let next = channel.next_report(Instant::now()).unwrap().unwrap();
        assert_eq!(next.payload, encode_record(RangeEstimate::new(3.0).unwrap()).to_vec());
        assert_eq!(channel.discard_pending().unwrap(), 0);
        assert_eq!(channel.discarded_report_count(), 1);
    }

    #[test]
    fn test_round_end_reads_as_silence() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let mut channel = MockReportChannel::new();
        channel.end_round();
        channel.push_range(peer, 1.0);

        assert!(channel.next_report(Instant::now()).unwrap().is_none());
        assert_eq!(channel.queued_report_count(), 1);
    }

    #[test]
    fn test_scripted_source_exhausts() {
        let mut source = MockSignalSource::scripted([-40, -55]);
        assert_eq!(source.read_rssi(), Ok(-40));
        assert_eq!(source.read_rssi(), Ok(-55));
        assert!(matches!(source.read_rssi(), Err(SignalError::Exhausted { .. })));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut source = MockSignalSource::steady(-50).with_jitter(3);
        for _ in 0..100 {
            let rssi = source.read_rssi().unwrap();
            assert!((-53..=-47).contains(&rssi));
        }
    }
}
