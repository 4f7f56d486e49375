//! # Congestion controllers
//!
//! One capability set — `on_pkt_to_send`, `on_pkt_sent`, `on_pkt_rcvd`,
//! `on_pkt_lost`, `tick`, `reset`, `get_est_rate_Bps` — implemented by a
//! sum type instead of a trait object, per the dynamic-dispatch redesign.

mod aurora;
mod bbr;
mod gcc;
mod no_cc;
mod oracle;
pub mod policy;

pub use aurora::{AuroraCc, AuroraMiRecord, RewardMode};
pub use bbr::{Bbr, BbrPhase};
pub use gcc::{
    DelayBasedController, Gcc, GccDelayLogRecord, GccSenderLogRecord, OveruseState,
    ProbeController, RemoteRateState,
};
pub use no_cc::NoCc;
pub use oracle::Oracle;
pub use policy::{FixedDeltaPolicy, LinearPolicy, Policy, PolicyError, UniformRandomPolicy};

use rand::rngs::StdRng;

use crate::packet::Packet;

pub enum CongestionControl {
    NoCc(NoCc),
    Oracle(Oracle),
    Bbr(Bbr),
    Gcc(Gcc),
    Aurora(AuroraCc),
}

impl CongestionControl {
    pub fn on_pkt_to_send(&mut self, pkt: &mut Packet, now_ms: u64) {
        match self {
            CongestionControl::Bbr(c) => c.on_pkt_to_send(pkt, now_ms),
            CongestionControl::Gcc(c) => c.on_pkt_to_send(pkt),
            _ => {}
        }
    }

    pub fn on_pkt_sent(&mut self, pkt: &Packet) {
        match self {
            CongestionControl::Bbr(c) => c.on_pkt_sent(pkt),
            CongestionControl::Aurora(c) => c.on_pkt_sent(pkt),
            _ => {}
        }
    }

    pub fn on_pkt_rcvd(&mut self, pkt: &Packet, rtt_ms: u64, now_ms: u64, rng: &mut StdRng) {
        match self {
            CongestionControl::Bbr(c) => c.on_pkt_rcvd(pkt, rtt_ms, now_ms, rng),
            CongestionControl::Aurora(c) => c.on_pkt_rcvd(pkt, rtt_ms, now_ms),
            _ => {}
        }
    }

    /// GCC-only: sender-side reaction to an RTCP report.
    pub fn on_rtcp_report(
        &mut self,
        loss_fraction: Option<f64>,
        remb_rate_bps: Option<f64>,
        probed_rate_bps: Option<f64>,
    ) {
        if let CongestionControl::Gcc(c) = self {
            c.on_rtcp_report(loss_fraction, remb_rate_bps, probed_rate_bps);
        }
    }

    pub fn on_pkt_lost(&mut self, pkt: &Packet) {
        match self {
            CongestionControl::Bbr(c) => c.on_pkt_lost(pkt),
            CongestionControl::Aurora(c) => c.on_pkt_lost(pkt),
            _ => {}
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        if let CongestionControl::Aurora(c) = self {
            c.tick(now_ms);
        }
    }

    pub fn get_est_rate_bps(&self, now_ms: u64, horizon_ms: u64) -> f64 {
        match self {
            CongestionControl::NoCc(c) => c.get_est_rate_bps(now_ms, horizon_ms),
            CongestionControl::Oracle(c) => c.get_est_rate_bps(now_ms, horizon_ms),
            CongestionControl::Bbr(c) => c.get_est_rate_bps(now_ms, horizon_ms),
            CongestionControl::Gcc(c) => c.get_est_rate_bps(now_ms, horizon_ms),
            CongestionControl::Aurora(c) => c.get_est_rate_bps(now_ms, horizon_ms),
        }
    }

    pub fn reset(&mut self) {
        match self {
            CongestionControl::NoCc(c) => c.reset(),
            CongestionControl::Oracle(c) => c.reset(),
            CongestionControl::Bbr(c) => c.reset(),
            CongestionControl::Gcc(c) => c.reset(),
            CongestionControl::Aurora(c) => c.reset(),
        }
    }

    /// Drains Aurora's closed-MI telemetry, for `aurora_mi_log.csv`.
    /// Empty for every other controller.
    pub fn take_aurora_mi_records(&mut self) -> Vec<AuroraMiRecord> {
        match self {
            CongestionControl::Aurora(c) => c.take_mi_records(),
            _ => Vec::new(),
        }
    }

    /// Drains GCC's sender-side RTCP-reaction telemetry, for `gcc_log_0.csv`.
    /// Empty for every other controller.
    pub fn take_gcc_sender_log_records(&mut self) -> Vec<GccSenderLogRecord> {
        match self {
            CongestionControl::Gcc(c) => c.take_log_records(),
            _ => Vec::new(),
        }
    }

    pub fn bbr_phase(&self) -> Option<BbrPhase> {
        match self {
            CongestionControl::Bbr(c) => Some(c.phase()),
            _ => None,
        }
    }

    pub fn can_send(&self, n_bytes: usize) -> bool {
        match self {
            CongestionControl::Bbr(c) => c.can_send(n_bytes),
            _ => true,
        }
    }
}
