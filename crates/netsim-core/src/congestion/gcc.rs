//! Google Congestion Control: a loss-based controller on the sender and
//! a delay-based controller on the receiver, reconciled through REMB.
//!
//! The delay-based half lives on the receiving host rather than in the
//! `CongestionControl` enum, since it observes arrival timing the sender
//! never sees; [`Gcc`] is the sender-side half the enum actually wraps.

use crate::packet::{Packet, RtpExtras};

const GCC_START_RATE_BPS: f64 = 12_500.0 * 3.0;
const LOSS_HIGH: f64 = 0.10;
const LOSS_LOW: f64 = 0.02;
const ETA: f64 = 1.05;
const ALPHA: f64 = 0.85;
const REMB_SEND_RATIO: f64 = 0.97;
const REMB_MAX_INCREASE_RATIO: f64 = 1.5;
const OVERUSE_SUSTAIN_MS: u64 = 10;
const KU: f64 = 0.01;
const KD: f64 = 0.00018;
const PROCESS_NOISE_Q: f64 = 1e-3;
const PROBE_PKTS_PER_CLUSTER: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OveruseState {
    Underuse,
    Normal,
    Overuse,
}

/// One receiver-side update, for `gcc_log_1.csv`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GccDelayLogRecord {
    pub now_ms: u64,
    pub m_hat: f64,
    pub gamma: f64,
    pub state: OveruseState,
    pub remote_rate_bps: f64,
    pub remb_emitted: bool,
}

/// One sender-side RTCP reaction, for `gcc_log_0.csv`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GccSenderLogRecord {
    pub loss_fraction: Option<f64>,
    pub remb_rate_bps: Option<f64>,
    pub loss_based_rate_bps: f64,
    pub effective_rate_bps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRateState {
    Increase,
    Decrease,
    Hold,
}

/// Adaptive Kalman filter over the inter-arrival/inter-send gradient.
struct KalmanGradientFilter {
    m_hat: f64,
    var_e: f64,
    var_v_hat: f64,
}

impl KalmanGradientFilter {
    fn new() -> Self {
        KalmanGradientFilter {
            m_hat: 0.0,
            var_e: 100.0,
            var_v_hat: 1e-2,
        }
    }

    fn update(&mut self, d: f64) -> f64 {
        let z = d - self.m_hat;
        const CHI: f64 = 0.1;
        self.var_v_hat = (CHI * z * z + (1.0 - CHI) * self.var_v_hat).max(1e-9);

        let k = self.var_e / (self.var_e + self.var_v_hat);
        self.m_hat += k * z;
        self.var_e = (1.0 - k) * self.var_e + PROCESS_NOISE_Q;

        let bound = 3.0 * self.var_v_hat.sqrt();
        self.m_hat = self.m_hat.clamp(-bound, bound);
        self.m_hat
    }
}

struct AdaptiveThreshold {
    gamma: f64,
}

impl AdaptiveThreshold {
    fn new() -> Self {
        AdaptiveThreshold { gamma: 12.5 }
    }

    fn update(&mut self, m_hat: f64, elapsed_ms: f64) {
        if m_hat.abs() > self.gamma {
            self.gamma += KU * elapsed_ms;
        } else {
            self.gamma -= KD * elapsed_ms;
        }
        self.gamma = self.gamma.clamp(6.0, 600.0);
    }
}

/// Three-state FSM deciding whether the link is being overused.
struct OveruseDetector {
    state: OveruseState,
    overuse_start_ms: Option<u64>,
}

impl OveruseDetector {
    fn new() -> Self {
        OveruseDetector {
            state: OveruseState::Normal,
            overuse_start_ms: None,
        }
    }

    fn update(&mut self, m_hat: f64, gamma: f64, now_ms: u64) -> OveruseState {
        if m_hat > gamma {
            let start = *self.overuse_start_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(start) >= OVERUSE_SUSTAIN_MS {
                self.state = OveruseState::Overuse;
            }
        } else if m_hat < -gamma {
            self.overuse_start_ms = None;
            self.state = OveruseState::Underuse;
        } else {
            self.overuse_start_ms = None;
            self.state = OveruseState::Normal;
        }
        self.state
    }
}

/// Receiver-side half: delay gradient -> overuse FSM -> remote rate -> REMB.
pub struct DelayBasedController {
    filter: KalmanGradientFilter,
    threshold: AdaptiveThreshold,
    detector: OveruseDetector,
    remote_rate_bps: f64,
    last_remb_sent_bps: f64,
    last_remb_ms: u64,
    remb_interval_ms: u64,
    prev_send_ms: Option<u64>,
    prev_recv_ms: Option<u64>,
    last_update_ms: u64,
    overuse_signalled_count: u32,
    pending_log: Vec<GccDelayLogRecord>,
}

impl DelayBasedController {
    pub fn new(remb_interval_ms: u64) -> Self {
        DelayBasedController {
            filter: KalmanGradientFilter::new(),
            threshold: AdaptiveThreshold::new(),
            detector: OveruseDetector::new(),
            remote_rate_bps: GCC_START_RATE_BPS,
            last_remb_sent_bps: GCC_START_RATE_BPS,
            last_remb_ms: 0,
            remb_interval_ms,
            prev_send_ms: None,
            prev_recv_ms: None,
            last_update_ms: 0,
            overuse_signalled_count: 0,
            pending_log: Vec::new(),
        }
    }

    pub fn overuse_signalled_count(&self) -> u32 {
        self.overuse_signalled_count
    }

    pub fn state(&self) -> OveruseState {
        self.detector.state
    }

    /// Drains per-update telemetry since the last call, for `gcc_log_1.csv`.
    pub fn take_log_records(&mut self) -> Vec<GccDelayLogRecord> {
        std::mem::take(&mut self.pending_log)
    }

    /// Feed one frame's send/receive timestamps and the measured receive
    /// rate over the window; returns `Some(remb_rate)` if a REMB should be
    /// emitted now (either by cadence or by the 0.97x drop rule).
    pub fn on_frame_rcvd(
        &mut self,
        send_ts_ms: u64,
        recv_ts_ms: u64,
        recv_rate_bps: f64,
        now_ms: u64,
    ) -> Option<f64> {
        let (prev_send, prev_recv) = match (self.prev_send_ms, self.prev_recv_ms) {
            (Some(s), Some(r)) => (s, r),
            _ => {
                self.prev_send_ms = Some(send_ts_ms);
                self.prev_recv_ms = Some(recv_ts_ms);
                return None;
            }
        };
        self.prev_send_ms = Some(send_ts_ms);
        self.prev_recv_ms = Some(recv_ts_ms);

        let d = (recv_ts_ms as f64 - prev_recv as f64) - (send_ts_ms as f64 - prev_send as f64);
        let elapsed_ms = now_ms.saturating_sub(self.last_update_ms).max(1) as f64;
        self.last_update_ms = now_ms;

        let m_hat = self.filter.update(d);
        self.threshold.update(m_hat, elapsed_ms);
        let overuse_state = self.detector.update(m_hat, self.threshold.gamma, now_ms);
        if overuse_state == OveruseState::Overuse {
            self.overuse_signalled_count += 1;
        }

        let rr_state = match overuse_state {
            OveruseState::Underuse => RemoteRateState::Hold,
            OveruseState::Overuse => RemoteRateState::Decrease,
            OveruseState::Normal => RemoteRateState::Increase,
        };

        let prior = self.remote_rate_bps;
        self.remote_rate_bps = match rr_state {
            RemoteRateState::Increase => {
                let grown = ETA.powf(elapsed_ms / 1000.0) * self.remote_rate_bps;
                grown.min(REMB_MAX_INCREASE_RATIO * recv_rate_bps)
            }
            RemoteRateState::Decrease => {
                (ALPHA * recv_rate_bps).min(REMB_MAX_INCREASE_RATIO * recv_rate_bps)
            }
            RemoteRateState::Hold => self.remote_rate_bps.min(REMB_MAX_INCREASE_RATIO * recv_rate_bps),
        };

        let urgent = self.remote_rate_bps < REMB_SEND_RATIO * prior;
        let due = now_ms.saturating_sub(self.last_remb_ms) >= self.remb_interval_ms;
        let remb_emitted = urgent || due;
        if remb_emitted {
            self.last_remb_ms = now_ms;
            self.last_remb_sent_bps = self.remote_rate_bps;
        }

        self.pending_log.push(GccDelayLogRecord {
            now_ms,
            m_hat,
            gamma: self.threshold.gamma,
            state: overuse_state,
            remote_rate_bps: self.remote_rate_bps,
            remb_emitted,
        });

        if remb_emitted {
            Some(self.remote_rate_bps)
        } else {
            None
        }
    }

    pub fn last_remb_bps(&self) -> f64 {
        self.last_remb_sent_bps
    }
}

/// Sender-side half: pure loss-reaction, reconciled against the last REMB.
pub struct Gcc {
    loss_based_rate_bps: f64,
    remb_rate_bps: f64,
    probe: ProbeController,
    next_cluster_id: u64,
    /// `(cluster_id, pkts_remaining, rate_multiple)` while a startup probe
    /// burst is in flight.
    active_cluster: Option<(u64, u32, f64)>,
    pending_log: Vec<GccSenderLogRecord>,
}

impl Gcc {
    pub fn new() -> Self {
        Gcc {
            loss_based_rate_bps: GCC_START_RATE_BPS,
            remb_rate_bps: GCC_START_RATE_BPS,
            probe: ProbeController::new(),
            next_cluster_id: 0,
            active_cluster: None,
            pending_log: Vec::new(),
        }
    }

    /// Drains per-report telemetry since the last call, for `gcc_log_0.csv`.
    pub fn take_log_records(&mut self) -> Vec<GccSenderLogRecord> {
        std::mem::take(&mut self.pending_log)
    }

    /// Called when an RTCP report arrives at the sender. `probed_rate_bps`,
    /// when present, is the receiver's `min(sender_observed, receiver_observed)`
    /// capacity estimate for a completed probe cluster, and seeds the
    /// delay-based (REMB) side of the estimator before any REMB has arrived.
    pub fn on_rtcp_report(
        &mut self,
        loss_fraction: Option<f64>,
        remb_rate_bps: Option<f64>,
        probed_rate_bps: Option<f64>,
    ) {
        if let Some(rho) = loss_fraction {
            if rho > LOSS_HIGH {
                self.loss_based_rate_bps *= 1.0 - 0.5 * rho;
            } else if rho < LOSS_LOW {
                self.loss_based_rate_bps *= 1.05;
            }
            // else: unchanged, including the "no report" / zero-expected case.
        }
        if let Some(probed) = probed_rate_bps {
            self.remb_rate_bps = probed;
        }
        if let Some(remb) = remb_rate_bps {
            self.remb_rate_bps = remb;
        }

        self.pending_log.push(GccSenderLogRecord {
            loss_fraction,
            remb_rate_bps,
            loss_based_rate_bps: self.loss_based_rate_bps,
            effective_rate_bps: self.loss_based_rate_bps.min(self.remb_rate_bps),
        });
    }

    /// Tags up to `PROBE_PKTS_PER_CLUSTER` consecutive packets per startup
    /// cluster with a `probe_cluster_id`, for the receiver to accumulate and
    /// report back (§4.5 probe tracking).
    pub fn on_pkt_to_send(&mut self, pkt: &mut Packet) {
        pkt.extras = crate::packet::AlgorithmExtras::Rtp(RtpExtras::default());

        if self.active_cluster.is_none() {
            if let Some(multiple) = self.probe.next_cluster_rate_multiple() {
                self.next_cluster_id += 1;
                self.active_cluster = Some((self.next_cluster_id, PROBE_PKTS_PER_CLUSTER, multiple));
            }
        }
        if let Some((cluster_id, remaining, _)) = &mut self.active_cluster {
            pkt.app_data.probe_cluster_id = Some(*cluster_id);
            *remaining -= 1;
            if *remaining == 0 {
                self.active_cluster = None;
            }
        }
    }

    pub fn get_est_rate_bps(&self, _now_ms: u64, _horizon_ms: u64) -> f64 {
        let base = self.loss_based_rate_bps.min(self.remb_rate_bps);
        match self.active_cluster {
            Some((_, _, multiple)) => base * multiple,
            None => base,
        }
    }

    pub fn reset(&mut self) {
        *self = Gcc::new();
    }
}



impl Default for Gcc {
    fn default() -> Self {
        Gcc::new()
    }
}

/// Startup probe bursts at 3x / 6x the initial rate.
pub struct ProbeController {
    clusters_sent: u32,
    max_clusters: u32,
}

impl ProbeController {
    pub fn new() -> Self {
        ProbeController {
            clusters_sent: 0,
            max_clusters: 2,
        }
    }

    /// Returns the next probe cluster's target rate multiple, if any remain.
    pub fn next_cluster_rate_multiple(&mut self) -> Option<f64> {
        if self.clusters_sent >= self.max_clusters {
            return None;
        }
        let multiple = if self.clusters_sent == 0 { 3.0 } else { 6.0 };
        self.clusters_sent += 1;
        Some(multiple)
    }
}

impl Default for ProbeController {
    fn default() -> Self {
        ProbeController::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_loss_reduces_rate() {
        let mut gcc = Gcc::new();
        let before = gcc.get_est_rate_bps(0, 0);
        gcc.on_rtcp_report(Some(0.2), None, None);
        assert!(gcc.get_est_rate_bps(0, 0) < before);
    }

    #[test]
    fn low_loss_increases_rate() {
        let mut gcc = Gcc::new();
        let before = gcc.get_est_rate_bps(0, 0);
        gcc.on_rtcp_report(Some(0.0), None, None);
        assert!(gcc.get_est_rate_bps(0, 0) > before);
    }

    #[test]
    fn mid_range_loss_unchanged() {
        let mut gcc = Gcc::new();
        let before = gcc.get_est_rate_bps(0, 0);
        gcc.on_rtcp_report(Some(0.05), None, None);
        assert_eq!(gcc.get_est_rate_bps(0, 0), before);
    }

    #[test]
    fn no_report_leaves_rate_unchanged() {
        let mut gcc = Gcc::new();
        let before = gcc.get_est_rate_bps(0, 0);
        gcc.on_rtcp_report(None, None, None);
        assert_eq!(gcc.get_est_rate_bps(0, 0), before);
    }

    #[test]
    fn effective_rate_is_min_of_loss_and_remb() {
        let mut gcc = Gcc::new();
        gcc.on_rtcp_report(None, Some(1000.0), None);
        gcc.loss_based_rate_bps = 5000.0;
        assert_eq!(gcc.get_est_rate_bps(0, 0), 1000.0);
    }

    #[test]
    fn probed_rate_seeds_remb_before_any_remb_arrives() {
        let mut gcc = Gcc::new();
        gcc.on_rtcp_report(None, None, Some(2_500_000.0));
        assert_eq!(gcc.remb_rate_bps, 2_500_000.0);
    }

    #[test]
    fn a_later_remb_overrides_the_probed_seed() {
        let mut gcc = Gcc::new();
        gcc.on_rtcp_report(None, None, Some(2_500_000.0));
        gcc.on_rtcp_report(None, Some(4_000_000.0), None);
        assert_eq!(gcc.remb_rate_bps, 4_000_000.0);
    }

    #[test]
    fn sustained_overuse_is_counted() {
        let mut delay = DelayBasedController::new(1000);
        let mut now = 0u64;
        // First call just seeds prev timestamps.
        delay.on_frame_rcvd(now, now, 100_000.0, now);
        for _ in 0..50 {
            now += 5;
            // growing one-way delay => positive gradient => overuse
            delay.on_frame_rcvd(now, now + 40, 100_000.0, now);
        }
        assert!(delay.overuse_signalled_count() >= 1);
    }

    #[test]
    fn probe_controller_yields_3x_then_6x_then_none() {
        let mut p = ProbeController::new();
        assert_eq!(p.next_cluster_rate_multiple(), Some(3.0));
        assert_eq!(p.next_cluster_rate_multiple(), Some(6.0));
        assert_eq!(p.next_cluster_rate_multiple(), None);
    }
}
