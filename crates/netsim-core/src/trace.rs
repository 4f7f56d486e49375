//! # Trace — time-varying link conditions
//!
//! An immutable, piecewise-constant right-continuous bandwidth schedule plus
//! scalar link parameters, loaded from JSON or built programmatically.

use serde::{Deserialize, Serialize};

/// Errors loading or validating a [`Trace`].
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("failed to parse trace JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace has no bandwidth breakpoints")]
    EmptyBreakpoints,
    #[error("trace timestamps and bandwidths length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("loss_rate {0} outside [0, 1]")]
    InvalidLossRate(f64),
}

/// On-disk JSON representation (§6 of the spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFile {
    pub duration: f64,
    pub timestamps_sec: Vec<f64>,
    pub bandwidths_mbps: Vec<f64>,
    pub min_delay_ms: f64,
    pub loss_rate: f64,
    pub queue_size: u64,
    #[serde(default)]
    pub delay_noise_ms: Option<f64>,
}

/// Time-varying bandwidth, propagation delay, queue cap, and random-loss
/// rate for one link. Immutable during a run.
#[derive(Debug, Clone)]
pub struct Trace {
    /// Co-indexed with `bandwidths_mbps`; piecewise-constant, right-continuous.
    timestamps_sec: Vec<f64>,
    bandwidths_mbps: Vec<f64>,
    pub min_delay_ms: u64,
    pub loss_rate: f64,
    pub queue_size_packets: u64,
    pub delay_noise_ms: Option<u64>,
    pub duration_sec: f64,
}

impl Trace {
    /// Build a trace from explicit breakpoints, validating shape.
    pub fn new(
        timestamps_sec: Vec<f64>,
        bandwidths_mbps: Vec<f64>,
        min_delay_ms: u64,
        loss_rate: f64,
        queue_size_packets: u64,
        delay_noise_ms: Option<u64>,
        duration_sec: f64,
    ) -> Result<Self, TraceError> {
        if timestamps_sec.is_empty() || bandwidths_mbps.is_empty() {
            return Err(TraceError::EmptyBreakpoints);
        }
        if timestamps_sec.len() != bandwidths_mbps.len() {
            return Err(TraceError::LengthMismatch(
                timestamps_sec.len(),
                bandwidths_mbps.len(),
            ));
        }
        if !(0.0..=1.0).contains(&loss_rate) {
            return Err(TraceError::InvalidLossRate(loss_rate));
        }
        Ok(Trace {
            timestamps_sec,
            bandwidths_mbps,
            min_delay_ms,
            loss_rate,
            queue_size_packets,
            delay_noise_ms,
            duration_sec,
        })
    }

    /// Constant-bandwidth convenience constructor (used widely in tests).
    pub fn constant(
        bandwidth_mbps: f64,
        min_delay_ms: u64,
        loss_rate: f64,
        queue_size_packets: u64,
        duration_sec: f64,
    ) -> Self {
        Trace {
            timestamps_sec: vec![0.0],
            bandwidths_mbps: vec![bandwidth_mbps],
            min_delay_ms,
            loss_rate,
            queue_size_packets,
            delay_noise_ms: None,
            duration_sec,
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, TraceError> {
        let file: TraceFile = serde_json::from_str(s)?;
        Self::from_file(file)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, TraceError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_file(file: TraceFile) -> Result<Self, TraceError> {
        let delay_noise_ms = file.delay_noise_ms.map(|v| v.round() as u64);
        Trace::new(
            file.timestamps_sec,
            file.bandwidths_mbps,
            file.min_delay_ms.round() as u64,
            file.loss_rate,
            file.queue_size,
            delay_noise_ms,
            file.duration,
        )
    }

    /// Serialize back to the JSON shape (for round-trip tests).
    pub fn to_file(&self) -> TraceFile {
        TraceFile {
            duration: self.duration_sec,
            timestamps_sec: self.timestamps_sec.clone(),
            bandwidths_mbps: self.bandwidths_mbps.clone(),
            min_delay_ms: self.min_delay_ms as f64,
            loss_rate: self.loss_rate,
            queue_size: self.queue_size_packets,
            delay_noise_ms: self.delay_noise_ms.map(|v| v as f64),
        }
    }

    /// Instantaneous bandwidth (bits/sec) at time `t` (seconds).
    pub fn bandwidth_at(&self, t: f64) -> f64 {
        let mbps = self.segment_mbps_at(t);
        mbps * 1_000_000.0
    }

    fn segment_mbps_at(&self, t: f64) -> f64 {
        // Piecewise-constant, right-continuous: pick the last breakpoint
        // whose timestamp is <= t.
        let mut idx = 0;
        for (i, &ts) in self.timestamps_sec.iter().enumerate() {
            if ts <= t {
                idx = i;
            } else {
                break;
            }
        }
        self.bandwidths_mbps[idx]
    }

    /// Definite integral of bandwidth (bits) over `[t0, t1]` seconds.
    pub fn bits_available(&self, t0: f64, t1: f64) -> f64 {
        if t1 <= t0 {
            return 0.0;
        }
        let mut total = 0.0;
        let mut cursor = t0;
        // Walk breakpoints strictly inside (t0, t1), integrating each
        // constant segment separately.
        let mut boundaries: Vec<f64> = self
            .timestamps_sec
            .iter()
            .copied()
            .filter(|&ts| ts > t0 && ts < t1)
            .collect();
        boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap());
        boundaries.push(t1);
        for b in boundaries {
            let mbps = self.segment_mbps_at(cursor);
            total += mbps * 1_000_000.0 * (b - cursor);
            cursor = b;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_bandwidth_integrates_linearly() {
        let tr = Trace::constant(1.0, 25, 0.0, 100, 10.0); // 1 Mbps
        let bits = tr.bits_available(0.0, 2.0);
        assert!((bits - 2_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn bandwidth_at_is_piecewise_constant_right_continuous() {
        let tr = Trace::new(
            vec![0.0, 5.0, 10.0],
            vec![1.0, 0.5, 2.0],
            25,
            0.0,
            100,
            None,
            15.0,
        )
        .unwrap();
        assert_eq!(tr.bandwidth_at(0.0), 1_000_000.0);
        assert_eq!(tr.bandwidth_at(4.999), 1_000_000.0);
        assert_eq!(tr.bandwidth_at(5.0), 500_000.0);
        assert_eq!(tr.bandwidth_at(9.999), 500_000.0);
        assert_eq!(tr.bandwidth_at(10.0), 2_000_000.0);
    }

    #[test]
    fn bits_available_across_step() {
        let tr = Trace::new(vec![0.0, 1.0], vec![1.0, 2.0], 25, 0.0, 100, None, 2.0).unwrap();
        // 1 Mbps for [0,1), 2 Mbps for [1,1.5)
        let bits = tr.bits_available(0.0, 1.5);
        assert!((bits - (1_000_000.0 + 1_000_000.0)).abs() < 1e-6);
    }

    #[test]
    fn rejects_invalid_loss_rate() {
        let err = Trace::new(vec![0.0], vec![1.0], 25, 1.5, 100, None, 1.0).unwrap_err();
        assert!(matches!(err, TraceError::InvalidLossRate(_)));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Trace::new(vec![0.0, 1.0], vec![1.0], 25, 0.0, 100, None, 1.0).unwrap_err();
        assert!(matches!(err, TraceError::LengthMismatch(2, 1)));
    }

    #[test]
    fn json_round_trip_is_semantically_equal() {
        let tr = Trace::new(
            vec![0.0, 2.5],
            vec![3.0, 1.5],
            30,
            0.05,
            50,
            Some(5),
            10.0,
        )
        .unwrap();
        let json = serde_json::to_string(&tr.to_file()).unwrap();
        let tr2 = Trace::from_json_str(&json).unwrap();
        assert_eq!(tr.timestamps_sec, tr2.timestamps_sec);
        assert_eq!(tr.bandwidths_mbps, tr2.bandwidths_mbps);
        assert_eq!(tr.min_delay_ms, tr2.min_delay_ms);
        assert_eq!(tr.loss_rate, tr2.loss_rate);
        assert_eq!(tr.queue_size_packets, tr2.queue_size_packets);
        assert_eq!(tr.delay_noise_ms, tr2.delay_noise_ms);
    }
}
