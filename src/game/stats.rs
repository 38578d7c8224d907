//! Server telemetry: tick-owned counters and a published snapshot

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::util::time::uptime_secs;

/// Samples kept for every rolling average
pub const AVERAGE_CAPACITY: usize = 30;

/// Counters bumped directly by connection tasks
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    rejected: AtomicU64,
    malformed: AtomicU64,
}

impl ConnectionCounters {
    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        let bytes = bytes as u64;
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> (u64, u64, u64, u64) {
        (
            self.messages_received.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.malformed.load(Ordering::Relaxed),
        )
    }
}

/// Fixed-window moving average
#[derive(Debug, Clone)]
pub struct Rolling {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Rolling {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }
}

/// Point-in-time view served on `/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub ticks: u64,
    pub tick_time_avg_ms: f64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub tick_messages_sent_avg: f64,
    pub tick_messages_received_avg: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub tick_bytes_sent_avg: f64,
    pub tick_bytes_received_avg: f64,
    pub players_current: usize,
    pub players_joined: u64,
    pub players_left: u64,
    pub players_rejected: u64,
    pub joins_cancelled: u64,
    pub malformed_messages: u64,
    pub overflow_disconnects: u64,
}

/// Cheap-to-clone reader side plus the connection counters
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    snapshot: Arc<RwLock<StatsSnapshot>>,
    counters: Arc<ConnectionCounters>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot.read().clone()
    }

    pub fn counters(&self) -> &ConnectionCounters {
        &self.counters
    }
}

/// What one tick did, as reported by the tick loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub duration: Duration,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub joined: u64,
    pub left: u64,
    pub cancelled: u64,
    pub overflowed: u64,
    pub population: usize,
}

/// Telemetry owned by the tick loop
#[derive(Debug)]
pub struct Stats {
    handle: StatsHandle,
    current: StatsSnapshot,
    tick_times: Rolling,
    tick_messages_sent: Rolling,
    tick_messages_received: Rolling,
    tick_bytes_sent: Rolling,
    tick_bytes_received: Rolling,
}

impl Stats {
    pub fn new(handle: StatsHandle) -> Self {
        Self {
            handle,
            current: StatsSnapshot::default(),
            tick_times: Rolling::new(AVERAGE_CAPACITY),
            tick_messages_sent: Rolling::new(AVERAGE_CAPACITY),
            tick_messages_received: Rolling::new(AVERAGE_CAPACITY),
            tick_bytes_sent: Rolling::new(AVERAGE_CAPACITY),
            tick_bytes_received: Rolling::new(AVERAGE_CAPACITY),
        }
    }

    /// Fold a finished tick into the totals and publish a new snapshot
    pub fn record_tick(&mut self, report: &TickReport) {
        let (received, received_bytes, rejected, malformed) = self.handle.counters.load();
        let s = &mut self.current;

        let tick_received = received.saturating_sub(s.messages_received);
        let tick_received_bytes = received_bytes.saturating_sub(s.bytes_received);

        self.tick_times.push(report.duration.as_secs_f64() * 1000.0);
        self.tick_messages_sent.push(report.messages_sent as f64);
        self.tick_bytes_sent.push(report.bytes_sent as f64);
        self.tick_messages_received.push(tick_received as f64);
        self.tick_bytes_received.push(tick_received_bytes as f64);

        s.uptime_secs = uptime_secs();
        s.ticks += 1;
        s.messages_sent += report.messages_sent;
        s.bytes_sent += report.bytes_sent;
        s.messages_received = received;
        s.bytes_received = received_bytes;
        s.players_current = report.population;
        s.players_joined += report.joined;
        s.players_left += report.left;
        s.joins_cancelled += report.cancelled;
        s.overflow_disconnects += report.overflowed;
        s.players_rejected = rejected;
        s.malformed_messages = malformed;

        s.tick_time_avg_ms = self.tick_times.average();
        s.tick_messages_sent_avg = self.tick_messages_sent.average();
        s.tick_messages_received_avg = self.tick_messages_received.average();
        s.tick_bytes_sent_avg = self.tick_bytes_sent.average();
        s.tick_bytes_received_avg = self.tick_bytes_received.average();

        *self.handle.snapshot.write() = s.clone();
    }

    pub fn current(&self) -> &StatsSnapshot {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_rolling_average_keeps_window() {
        let mut rolling = Rolling::new(3);
        assert_eq!(rolling.average(), 0.0);

        for sample in [1.0, 2.0, 3.0, 10.0] {
            rolling.push(sample);
        }
        // 1.0 fell out of the window.
        assert_approx_eq!(rolling.average(), 5.0);
    }

    #[test]
    fn test_record_tick_accumulates_and_publishes() {
        let handle = StatsHandle::new();
        let mut stats = Stats::new(handle.clone());

        handle.counters().record_received(3);
        handle.counters().record_received(5);
        handle.counters().record_rejected();

        stats.record_tick(&TickReport {
            duration: Duration::from_millis(2),
            messages_sent: 4,
            bytes_sent: 56,
            joined: 2,
            population: 2,
            ..TickReport::default()
        });
        stats.record_tick(&TickReport {
            duration: Duration::from_millis(4),
            messages_sent: 2,
            bytes_sent: 10,
            left: 1,
            cancelled: 1,
            population: 1,
            ..TickReport::default()
        });

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.messages_sent, 6);
        assert_eq!(snapshot.bytes_sent, 66);
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.bytes_received, 8);
        assert_eq!(snapshot.players_joined, 2);
        assert_eq!(snapshot.players_left, 1);
        assert_eq!(snapshot.joins_cancelled, 1);
        assert_eq!(snapshot.players_rejected, 1);
        assert_eq!(snapshot.players_current, 1);
        assert_approx_eq!(snapshot.tick_time_avg_ms, 3.0, 1e-9);
        assert_approx_eq!(snapshot.tick_messages_sent_avg, 3.0);
        // Both received messages landed in the first tick.
        assert_approx_eq!(snapshot.tick_messages_received_avg, 1.0);
        assert_eq!(&snapshot, stats.current());
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert_eq!(json["players_current"], 0);
        assert!(json.get("tick_time_avg_ms").is_some());
    }
}
