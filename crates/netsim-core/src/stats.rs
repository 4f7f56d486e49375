//! # Stats — append-only event log and smoothing helpers
//!
//! The recorder itself is policy-free: it only appends typed events.
//! `netsim-sim` drains it each run and flattens it to `pkt_log.csv`.

use serde::Serialize;

/// One packet-lifecycle event, timestamped at 1ms resolution.
#[derive(Debug, Clone, Serialize)]
pub struct PktEvent {
    pub ts_ms: u64,
    pub pkt_id: u64,
    pub kind: String,
    pub event: PktEventKind,
    pub size_bytes: usize,
    pub owd_ms: Option<u64>,
    pub rtt_ms: Option<u64>,
    pub queue_size_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PktEventKind {
    Sent,
    Arrived,
    Acked,
    Lost,
    Nacked,
}

/// Exponentially-weighted moving average, `value ← α·sample + (1-α)·value`.
#[derive(Debug, Clone, Copy)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    pub fn new(alpha: f64) -> Self {
        Ewma { alpha, value: None }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        let v = match self.value {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        };
        self.value = Some(v);
        v
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// A windowed byte-rate counter, reset on read.
#[derive(Debug, Clone)]
pub struct RateCounter {
    bytes_since_reset: u64,
    window_start_ms: u64,
}

impl RateCounter {
    pub fn new(now_ms: u64) -> Self {
        RateCounter {
            bytes_since_reset: 0,
            window_start_ms: now_ms,
        }
    }

    pub fn add(&mut self, bytes: usize) {
        self.bytes_since_reset += bytes as u64;
    }

    /// Bytes/sec since the last reset; resets the window.
    pub fn rate_bps_and_reset(&mut self, now_ms: u64) -> f64 {
        let elapsed_ms = now_ms.saturating_sub(self.window_start_ms);
        let rate = if elapsed_ms == 0 {
            0.0
        } else {
            self.bytes_since_reset as f64 * 1000.0 / elapsed_ms as f64
        };
        self.bytes_since_reset = 0;
        self.window_start_ms = now_ms;
        rate
    }
}

/// Append-only event sink. Cheap to clone the drained `Vec` out each run.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    events: Vec<PktEvent>,
    bytes_sent: u64,
    bytes_acked: u64,
    bytes_lost: u64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        StatsRecorder::default()
    }

    pub fn record(&mut self, event: PktEvent) {
        match event.event {
            PktEventKind::Sent => self.bytes_sent += event.size_bytes as u64,
            PktEventKind::Acked => self.bytes_acked += event.size_bytes as u64,
            PktEventKind::Lost => self.bytes_lost += event.size_bytes as u64,
            _ => {}
        }
        self.events.push(event);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_acked(&self) -> u64 {
        self.bytes_acked
    }

    pub fn bytes_lost(&self) -> u64 {
        self.bytes_lost
    }

    pub fn events(&self) -> &[PktEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<PktEvent> {
        std::mem::take(&mut self.events)
    }
}
