//! BBRv1: STARTUP / DRAIN / PROBE_BW / PROBE_RTT, driven by a windowed-max
//! bottleneck-bandwidth filter and a windowed-min round-trip-propagation
//! filter, per the IETF draft state machine.

use std::collections::VecDeque;

use rand::Rng;
use rand::rngs::StdRng;

use crate::packet::{BbrExtras, Packet};

const BBR_HIGH_GAIN: f64 = 2.89;
const BTLBW_FILTER_LEN: u64 = 10;
const RTPROP_FILTER_EXPIRY_MS: u64 = 10_000;
const PROBE_RTT_DURATION_MS: u64 = 200;
const MIN_PIPE_CWND_MSS: usize = 4;
const GAIN_CYCLE: [f64; 8] = [5.0 / 4.0, 3.0 / 4.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
const STARTUP_GROWTH_THRESHOLD: f64 = 1.25;
const STARTUP_ROUNDS_BEFORE_EXIT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BbrPhase {
    Startup,
    Drain,
    ProbeBw,
    ProbeRtt,
}

struct BtlBwFilter {
    window: VecDeque<(u64, f64)>,
}

impl BtlBwFilter {
    fn new() -> Self {
        BtlBwFilter {
            window: VecDeque::new(),
        }
    }

    fn update(&mut self, round: u64, sample_bps: f64) {
        while let Some(&(r, _)) = self.window.front() {
            if round.saturating_sub(r) >= BTLBW_FILTER_LEN {
                self.window.pop_front();
            } else {
                break;
            }
        }
        self.window.push_back((round, sample_bps));
    }

    fn max(&self) -> f64 {
        self.window
            .iter()
            .map(|&(_, v)| v)
            .fold(0.0_f64, f64::max)
    }
}

struct RtPropFilter {
    min_rtt_ms: Option<u64>,
    stamped_at_ms: u64,
}

impl RtPropFilter {
    fn new() -> Self {
        RtPropFilter {
            min_rtt_ms: None,
            stamped_at_ms: 0,
        }
    }

    fn update(&mut self, rtt_ms: u64, now_ms: u64) -> bool {
        let expired = now_ms.saturating_sub(self.stamped_at_ms) > RTPROP_FILTER_EXPIRY_MS;
        if self.min_rtt_ms.is_none() || rtt_ms <= self.min_rtt_ms.unwrap() || expired {
            self.min_rtt_ms = Some(rtt_ms);
            self.stamped_at_ms = now_ms;
        }
        expired
    }

    fn value_ms(&self) -> u64 {
        self.min_rtt_ms.unwrap_or(0)
    }
}

pub struct Bbr {
    mss: usize,
    phase: BbrPhase,
    btlbw: BtlBwFilter,
    rtprop: RtPropFilter,

    round_count: u64,
    next_round_delivered_byte: u64,
    delivered_byte: u64,

    full_bw_bps: f64,
    full_bw_count: u32,

    cycle_index: usize,
    cycle_start_ms: u64,

    probe_rtt_round_done: bool,
    probe_rtt_done_stamp_ms: Option<u64>,
    bytes_in_flight: usize,

    cwnd_byte: usize,
    pacing_rate_bps: f64,
}

impl Bbr {
    pub fn new(mss: usize, init_rate_bps: f64) -> Self {
        Bbr {
            mss,
            phase: BbrPhase::Startup,
            btlbw: BtlBwFilter::new(),
            rtprop: RtPropFilter::new(),
            round_count: 0,
            next_round_delivered_byte: 0,
            delivered_byte: 0,
            full_bw_bps: 0.0,
            full_bw_count: 0,
            cycle_index: 0,
            cycle_start_ms: 0,
            probe_rtt_round_done: false,
            probe_rtt_done_stamp_ms: None,
            bytes_in_flight: 0,
            cwnd_byte: MIN_PIPE_CWND_MSS * mss,
            pacing_rate_bps: init_rate_bps,
        }
    }

    pub fn phase(&self) -> BbrPhase {
        self.phase
    }

    pub fn can_send(&self, n_bytes: usize) -> bool {
        self.bytes_in_flight + n_bytes <= self.cwnd_byte
    }

    pub fn on_pkt_to_send(&mut self, pkt: &mut Packet, now_ms: u64) {
        pkt.extras = crate::packet::AlgorithmExtras::Bbr(BbrExtras {
            delivered_byte: self.delivered_byte,
            delivered_time_ms: now_ms,
            first_sent_time_ms: now_ms,
            is_app_limited: false,
        });
    }

    pub fn on_pkt_sent(&mut self, pkt: &Packet) {
        self.bytes_in_flight += pkt.size_bytes;
        if self.delivered_byte >= self.next_round_delivered_byte {
            self.next_round_delivered_byte = self.delivered_byte + pkt.size_bytes as u64;
        }
    }

    pub fn on_pkt_lost(&mut self, pkt: &Packet) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(pkt.size_bytes);
    }

    /// Process a rate sample delivered by an ACK. Returns nothing; all
    /// state transitions happen inline.
    pub fn on_pkt_rcvd(&mut self, pkt: &Packet, rtt_ms: u64, now_ms: u64, rng: &mut StdRng) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(pkt.size_bytes);
        self.delivered_byte += pkt.size_bytes as u64;

        if self.delivered_byte >= self.next_round_delivered_byte {
            self.round_count += 1;
        }

        let is_app_limited = match &pkt.extras {
            crate::packet::AlgorithmExtras::Bbr(e) => e.is_app_limited,
            _ => false,
        };

        let interval_s = rtt_ms.max(1) as f64 / 1000.0;
        let delivery_rate_bps = pkt.size_bytes as f64 / interval_s;
        if !is_app_limited {
            self.btlbw.update(self.round_count, delivery_rate_bps);
        }

        let rtprop_expired = self.rtprop.update(rtt_ms, now_ms);

        self.check_startup_done();
        self.check_drain_done();
        self.check_probe_rtt(now_ms, rtprop_expired);
        self.advance_probe_bw_cycle(now_ms, rng);
        self.update_pacing_rate_and_cwnd();
    }

    fn btlbw_bps(&self) -> f64 {
        self.btlbw.max()
    }

    fn bdp_bytes(&self) -> f64 {
        self.btlbw_bps() * (self.rtprop.value_ms() as f64 / 1000.0)
    }

    fn send_quantum(&self) -> usize {
        if self.btlbw_bps() < 1_200_000.0 / 8.0 {
            self.mss
        } else if self.btlbw_bps() < 24_000_000.0 / 8.0 {
            2 * self.mss
        } else {
            65536
        }
    }

    fn check_startup_done(&mut self) {
        if self.phase != BbrPhase::Startup {
            return;
        }
        let bw = self.btlbw_bps();
        if bw >= self.full_bw_bps * STARTUP_GROWTH_THRESHOLD {
            self.full_bw_bps = bw;
            self.full_bw_count = 0;
        } else {
            self.full_bw_count += 1;
        }
        if self.full_bw_count >= STARTUP_ROUNDS_BEFORE_EXIT {
            self.phase = BbrPhase::Drain;
        }
    }

    fn check_drain_done(&mut self) {
        if self.phase != BbrPhase::Drain {
            return;
        }
        if (self.bytes_in_flight as f64) <= self.bdp_bytes().max(self.mss as f64) {
            self.phase = BbrPhase::ProbeBw;
            self.cycle_index = 0;
            self.cycle_start_ms = 0;
        }
    }

    fn check_probe_rtt(&mut self, now_ms: u64, rtprop_expired: bool) {
        if self.phase != BbrPhase::ProbeRtt && rtprop_expired {
            self.phase = BbrPhase::ProbeRtt;
            self.probe_rtt_round_done = false;
            self.probe_rtt_done_stamp_ms = None;
        }

        if self.phase == BbrPhase::ProbeRtt {
            if self.bytes_in_flight <= MIN_PIPE_CWND_MSS * self.mss {
                if self.probe_rtt_done_stamp_ms.is_none() {
                    self.probe_rtt_done_stamp_ms = Some(now_ms + PROBE_RTT_DURATION_MS);
                }
            } else {
                self.probe_rtt_done_stamp_ms = None;
            }

            if let Some(done_ms) = self.probe_rtt_done_stamp_ms {
                if now_ms >= done_ms {
                    self.phase = BbrPhase::ProbeBw;
                    self.cycle_index = 0;
                    self.cycle_start_ms = now_ms;
                }
            }
        }
    }

    fn advance_probe_bw_cycle(&mut self, now_ms: u64, rng: &mut StdRng) {
        if self.phase != BbrPhase::ProbeBw {
            return;
        }
        let cycle_len_ms = self.rtprop.value_ms().max(1);
        if self.cycle_start_ms == 0 {
            self.cycle_index = rng.random_range(1..GAIN_CYCLE.len());
            self.cycle_start_ms = now_ms;
            return;
        }
        if now_ms.saturating_sub(self.cycle_start_ms) >= cycle_len_ms {
            self.cycle_index = (self.cycle_index + 1) % GAIN_CYCLE.len();
            self.cycle_start_ms = now_ms;
        }
    }

    fn pacing_gain(&self) -> f64 {
        match self.phase {
            BbrPhase::Startup => BBR_HIGH_GAIN,
            BbrPhase::Drain => 1.0 / BBR_HIGH_GAIN,
            BbrPhase::ProbeBw => GAIN_CYCLE[self.cycle_index],
            BbrPhase::ProbeRtt => 1.0,
        }
    }

    fn cwnd_gain(&self) -> f64 {
        match self.phase {
            BbrPhase::Startup => BBR_HIGH_GAIN,
            BbrPhase::Drain => BBR_HIGH_GAIN,
            BbrPhase::ProbeBw => 2.0,
            BbrPhase::ProbeRtt => 1.0,
        }
    }

    fn update_pacing_rate_and_cwnd(&mut self) {
        self.pacing_rate_bps = self.pacing_gain() * self.btlbw_bps();
        let target = self.cwnd_gain() * self.bdp_bytes() + 3.0 * self.send_quantum() as f64;
        self.cwnd_byte = (target as usize).max(MIN_PIPE_CWND_MSS * self.mss);
    }

    pub fn get_est_rate_bps(&self, _now_ms: u64, _horizon_ms: u64) -> f64 {
        if self.pacing_rate_bps <= 0.0 {
            // Bootstrap before any samples: send at twice MSS/RTT-less guess.
            2.0 * self.mss as f64 * 1000.0
        } else {
            self.pacing_rate_bps
        }
    }

    pub fn reset(&mut self) {
        *self = Bbr::new(self.mss, self.pacing_rate_bps);
    }
}
