//! # Host — the send/receive glue between application, CC, rtx, and link
//!
//! [`SenderHost`] owns its transport stack (pacer, CC, rtx manager, app)
//! and the data/ack links it drives; [`ReceiverHost`] owns the matching
//! receive-side state (loss detection, feedback generation, app).
//! Per-transport behaviour (Aurora/RTP/TCP) is a field enum rather than
//! a subclass, matching the rest of the crate's sum-type dispatch.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use tracing::{trace, warn};

use crate::app::Application;
use crate::config::SimConfig;
use crate::congestion::CongestionControl;
use crate::error::CoreResult;
use crate::link::{DropReason, Link, PushOutcome};
use crate::packet::{AckExtras, AlgorithmExtras, Packet, PacketKind, ProbeInfo, RtpExtras};
use crate::rtx::RtxManager;
use crate::stats::{Ewma, PktEvent, PktEventKind, StatsRecorder};

/// Per-transport sender-side bookkeeping beyond the shared pacer/cc/rtx.
pub enum SenderRole {
    Aurora,
    Rtp,
    Tcp { srtt_ms: Ewma, rttvar_ms: Ewma, min_rtt_ms: Option<u64> },
}

pub struct SenderHost {
    pub cc: CongestionControl,
    pub rtx: RtxManager,
    pub pacer: crate::pacer::Pacer,
    app: Box<dyn Application>,
    role: SenderRole,
    next_pkt_id: u64,
    stats: StatsRecorder,
    mss: usize,
}

impl SenderHost {
    pub fn new(
        cc: CongestionControl,
        rtx: RtxManager,
        pacer: crate::pacer::Pacer,
        app: Box<dyn Application>,
        role: SenderRole,
        config: &SimConfig,
    ) -> Self {
        SenderHost {
            cc,
            rtx,
            pacer,
            app,
            role,
            next_pkt_id: 1,
            stats: StatsRecorder::new(),
            mss: config.mss,
        }
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StatsRecorder {
        &mut self.stats
    }

    /// Gives a runner access to the concrete application (e.g. to drain
    /// an `Encoder`'s per-frame records) via `Application::as_any_mut`.
    pub fn app_mut(&mut self) -> &mut dyn Application {
        self.app.as_mut()
    }

    /// Feeds a decoded frame's quality/delay into Aurora's app-aware
    /// reward. No-op for every other congestion controller.
    pub fn on_frame_decoded(&mut self, frame_quality: f32, avg_delay_sec: f64) {
        if let CongestionControl::Aurora(c) = &mut self.cc {
            c.on_frame_decoded(frame_quality, avg_delay_sec);
        }
    }

    /// Drains the pacer's rate-update telemetry, for `pacer_log.csv`.
    pub fn take_pacer_log_records(&mut self) -> Vec<crate::pacer::PacerLogRecord> {
        self.pacer.take_log_records()
    }

    pub fn tick(
        &mut self,
        now_ms: u64,
        tx_link: &mut Link,
        ack_link: &mut Link,
        rng: &mut StdRng,
    ) -> CoreResult<()> {
        self.app.on_budget_update(
            self.pacer.pacing_rate_bps(),
            self.rtx.pending_bytes(),
            self.pacer.update_step_ms(),
        );
        self.app.tick(now_ms);

        let cc = &self.cc;
        self.pacer.tick(now_ms, |t0, t1| cc.get_est_rate_bps(t0, t1));
        self.cc.tick(now_ms);

        for lost in self.rtx.tick(now_ms) {
            self.cc.on_pkt_lost(&lost);
            self.stats.record(PktEvent {
                ts_ms: now_ms,
                pkt_id: lost.id,
                kind: lost.kind.to_string(),
                event: PktEventKind::Lost,
                size_bytes: lost.size_bytes,
                owd_ms: None,
                rtt_ms: None,
                queue_size_bytes: Some(tx_link.queue_size_bytes()),
            });
        }

        self.send_loop(now_ms, tx_link, rng)?;

        while let Some(pkt) = ack_link.pull(now_ms) {
            self.on_feedback_pkt(pkt, now_ms, tx_link, rng);
        }

        Ok(())
    }

    fn send_loop(&mut self, now_ms: u64, tx_link: &mut Link, rng: &mut StdRng) -> CoreResult<()> {
        loop {
            let budget = self.pacer.available_bytes();
            if budget == 0 {
                break;
            }

            let rtx_size = self.rtx.peek_pkt();
            let mut pkt = if rtx_size > 0 && rtx_size <= budget && self.cc.can_send(rtx_size) {
                match self.rtx.get_pkt() {
                    Some(mut p) => {
                        p.mark_resent(now_ms);
                        p
                    }
                    None => break,
                }
            } else if self.cc.can_send(budget.min(self.mss)) {
                match self.app.next_pkt(now_ms, budget) {
                    Some(p) => p,
                    None => break,
                }
            } else {
                break;
            };

            if pkt.id == 0 {
                pkt.id = self.next_pkt_id;
                self.next_pkt_id += 1;
                pkt.ts_first_sent_ms = now_ms;
            }
            pkt.ts_sent_ms = now_ms;

            self.cc.on_pkt_to_send(&mut pkt, now_ms);

            match tx_link.push(pkt.clone(), rng)? {
                PushOutcome::Enqueued => {
                    self.pacer.on_pkt_sent(pkt.size_bytes);
                    self.cc.on_pkt_sent(&pkt);
                    self.rtx.on_pkt_sent(pkt.clone(), now_ms);
                    self.stats.record(PktEvent {
                        ts_ms: now_ms,
                        pkt_id: pkt.id,
                        kind: pkt.kind.to_string(),
                        event: PktEventKind::Sent,
                        size_bytes: pkt.size_bytes,
                        owd_ms: None,
                        rtt_ms: None,
                        queue_size_bytes: Some(tx_link.queue_size_bytes()),
                    });
                }
                PushOutcome::Dropped(reason) => {
                    self.cc.on_pkt_lost(&pkt);
                    trace!(pkt_id = pkt.id, ?reason, "packet dropped at link push");
                    self.stats.record(PktEvent {
                        ts_ms: now_ms,
                        pkt_id: pkt.id,
                        kind: pkt.kind.to_string(),
                        event: PktEventKind::Lost,
                        size_bytes: pkt.size_bytes,
                        owd_ms: None,
                        rtt_ms: None,
                        queue_size_bytes: Some(tx_link.queue_size_bytes()),
                    });
                }
            }
        }
        Ok(())
    }

    fn on_feedback_pkt(&mut self, pkt: Packet, now_ms: u64, tx_link: &mut Link, rng: &mut StdRng) {
        match pkt.kind {
            PacketKind::Ack => {
                let AlgorithmExtras::Ack(extras) = pkt.extras else {
                    warn!("ACK packet missing AckExtras");
                    return;
                };
                let rtt_ms = now_ms.saturating_sub(extras.orig_ts_sent_ms);
                let synthetic = synthetic_acked_packet(pkt.id, extras, now_ms);
                self.cc.on_pkt_rcvd(&synthetic, rtt_ms, now_ms, rng);
                for lost in self.rtx.on_ack(pkt.id, rtt_ms, now_ms) {
                    self.cc.on_pkt_lost(&lost);
                }
                if let SenderRole::Tcp {
                    srtt_ms,
                    rttvar_ms,
                    min_rtt_ms,
                } = &mut self.role
                {
                    let srtt = srtt_ms.update(rtt_ms as f64);
                    rttvar_ms.update((rtt_ms as f64 - srtt).abs());
                    *min_rtt_ms = Some(min_rtt_ms.map_or(rtt_ms, |m| m.min(rtt_ms)));
                }
                self.stats.record(PktEvent {
                    ts_ms: now_ms,
                    pkt_id: pkt.id,
                    kind: "ACK".into(),
                    event: PktEventKind::Acked,
                    size_bytes: extras.acked_size_bytes,
                    owd_ms: None,
                    rtt_ms: Some(rtt_ms),
                    queue_size_bytes: Some(tx_link.queue_size_bytes()),
                });
            }
            PacketKind::Nack => {
                for resend in self.rtx.on_nack(pkt.id) {
                    trace!(pkt_id = resend.id, "nack re-queued for retransmit");
                }
                self.stats.record(PktEvent {
                    ts_ms: now_ms,
                    pkt_id: pkt.id,
                    kind: "NACK".into(),
                    event: PktEventKind::Nacked,
                    size_bytes: 0,
                    owd_ms: None,
                    rtt_ms: None,
                    queue_size_bytes: None,
                });
            }
            PacketKind::Rtcp => {
                if let AlgorithmExtras::Rtp(extras) = &pkt.extras {
                    let probed_rate_bps = extras.probe_info.map(|p| p.implied_rate_bps);
                    self.cc.on_rtcp_report(
                        extras.loss_fraction,
                        extras.estimated_rate_bps,
                        probed_rate_bps,
                    );
                }
            }
            _ => {}
        }
    }

    pub fn reset(&mut self) {
        self.cc.reset();
        self.rtx.reset();
        self.pacer.reset();
        self.app.reset();
    }
}

fn synthetic_acked_packet(orig_id: u64, extras: AckExtras, _now_ms: u64) -> Packet {
    let mut pkt = Packet::new(orig_id, PacketKind::Data, extras.acked_size_bytes, extras.orig_ts_sent_ms);
    pkt.ts_first_sent_ms = extras.orig_ts_sent_ms;
    pkt
}

/// Per-transport receiver-side bookkeeping.
pub enum ReceiverRole {
    Aurora,
    Rtp(Box<RtpReceiverState>),
    Tcp,
}

pub struct RtpReceiverState {
    pub highest_seen_id: Option<u64>,
    received_ids: BTreeSet<u64>,
    nack_retry_counts: HashMap<u64, u8>,
    last_nack_burst_ms: u64,
    last_report_ms: u64,
    last_remb_ms: u64,
    owd_ewma: Ewma,
    bytes_since_report: u64,
    lost_since_report: u64,
    expected_since_report: u64,
    max_retries: u8,
    burst_rtt_multiple: f64,
    report_interval_ms: u64,
    remb_interval_ms: u64,
    min_probe_duration_ms: u64,
    delay: crate::congestion::DelayBasedController,
    active_probe: Option<ProbeAccum>,
}

struct ProbeAccum {
    cluster_id: u64,
    first_send_ms: u64,
    last_send_ms: u64,
    first_rcv_ms: u64,
    last_rcv_ms: u64,
    total_bytes: usize,
    count: u32,
}

impl RtpReceiverState {
    pub fn new(config: &SimConfig) -> Self {
        RtpReceiverState {
            highest_seen_id: None,
            received_ids: BTreeSet::new(),
            nack_retry_counts: HashMap::new(),
            last_nack_burst_ms: 0,
            last_report_ms: 0,
            last_remb_ms: 0,
            owd_ewma: Ewma::new(1.0 / 8.0),
            bytes_since_report: 0,
            lost_since_report: 0,
            expected_since_report: 0,
            max_retries: config.rtp_nack_max_retries,
            burst_rtt_multiple: config.rtp_nack_burst_rtt_multiple,
            report_interval_ms: config.rtcp_report_interval_ms,
            remb_interval_ms: config.remb_interval_ms,
            min_probe_duration_ms: config.min_probe_duration_ms,
            delay: crate::congestion::DelayBasedController::new(config.remb_interval_ms),
            active_probe: None,
        }
    }
}

pub struct ReceiverHost {
    app: Box<dyn Application>,
    role: ReceiverRole,
    stats: StatsRecorder,
}

impl ReceiverHost {
    pub fn new(app: Box<dyn Application>, role: ReceiverRole) -> Self {
        ReceiverHost {
            app,
            role,
            stats: StatsRecorder::new(),
        }
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StatsRecorder {
        &mut self.stats
    }

    /// Gives a runner access to the concrete application (e.g. to drain
    /// a `Decoder`'s per-frame records) via `Application::as_any_mut`.
    pub fn app_mut(&mut self) -> &mut dyn Application {
        self.app.as_mut()
    }

    /// Drives the receiver for one tick and returns any video frame
    /// completions the application produced, for the caller to route into
    /// a sender-side congestion controller's app-aware signals. GCC's
    /// delay-based controller is fed internally, since it lives on this
    /// same receiver.
    pub fn tick(
        &mut self,
        now_ms: u64,
        rx_link: &mut Link,
        ack_link: &mut Link,
        rng: &mut StdRng,
    ) -> Vec<crate::app::FrameEvent> {
        self.app.tick(now_ms);

        while let Some(mut pkt) = rx_link.pull(now_ms) {
            pkt.ts_rcvd_ms = now_ms;
            let owd_ms = pkt.cur_delay_ms();
            self.stats.record(PktEvent {
                ts_ms: now_ms,
                pkt_id: pkt.id,
                kind: pkt.kind.to_string(),
                event: PktEventKind::Arrived,
                size_bytes: pkt.size_bytes,
                owd_ms: Some(owd_ms),
                rtt_ms: None,
                queue_size_bytes: Some(rx_link.queue_size_bytes()),
            });

            self.app.on_pkt_rcvd(&pkt, now_ms);

            match &mut self.role {
                ReceiverRole::Aurora => {
                    let ack = Packet {
                        id: pkt.id,
                        kind: PacketKind::Ack,
                        size_bytes: 40,
                        prop_delay_ms: 0,
                        queue_delay_ms: 0,
                        ts_sent_ms: now_ms,
                        ts_first_sent_ms: now_ms,
                        ts_rcvd_ms: 0,
                        app_data: Default::default(),
                        extras: AlgorithmExtras::Ack(AckExtras {
                            acked_size_bytes: pkt.size_bytes,
                            orig_ts_sent_ms: pkt.ts_first_sent_ms,
                        }),
                    };
                    let _ = ack_link.push(ack, rng);
                }
                ReceiverRole::Tcp => {
                    let ack = Packet {
                        id: pkt.id,
                        kind: PacketKind::Ack,
                        size_bytes: 40,
                        prop_delay_ms: 0,
                        queue_delay_ms: 0,
                        ts_sent_ms: now_ms,
                        ts_first_sent_ms: now_ms,
                        ts_rcvd_ms: 0,
                        app_data: Default::default(),
                        extras: AlgorithmExtras::Ack(AckExtras {
                            acked_size_bytes: pkt.size_bytes,
                            orig_ts_sent_ms: pkt.ts_first_sent_ms,
                        }),
                    };
                    let _ = ack_link.push(ack, rng);
                }
                ReceiverRole::Rtp(state) => {
                    Self::handle_rtp_arrival(state, &pkt, now_ms, ack_link, rng);
                }
            }
        }

        if let ReceiverRole::Rtp(state) = &mut self.role {
            Self::maybe_emit_rtcp(state, now_ms, ack_link, rng);
        }

        let events = self.app.take_frame_events();
        if let ReceiverRole::Rtp(state) = &mut self.role {
            for ev in &events {
                state
                    .delay
                    .on_frame_rcvd(ev.last_pkt_sent_ms, ev.last_pkt_rcv_ms, ev.recv_rate_bps, now_ms);
            }
        }
        events
    }

    fn handle_rtp_arrival(
        state: &mut RtpReceiverState,
        pkt: &Packet,
        now_ms: u64,
        ack_link: &mut Link,
        rng: &mut StdRng,
    ) {
        state.received_ids.insert(pkt.id);
        state.bytes_since_report += pkt.size_bytes as u64;
        state.expected_since_report += 1;
        let owd = pkt.cur_delay_ms() as f64;
        state.owd_ewma.update(owd);

        if let Some(cluster_id) = pkt.app_data.probe_cluster_id {
            let probe = state.active_probe.get_or_insert_with(|| ProbeAccum {
                cluster_id,
                first_send_ms: pkt.ts_sent_ms,
                last_send_ms: pkt.ts_sent_ms,
                first_rcv_ms: now_ms,
                last_rcv_ms: now_ms,
                total_bytes: 0,
                count: 0,
            });
            if probe.cluster_id != cluster_id {
                *probe = ProbeAccum {
                    cluster_id,
                    first_send_ms: pkt.ts_sent_ms,
                    last_send_ms: pkt.ts_sent_ms,
                    first_rcv_ms: now_ms,
                    last_rcv_ms: now_ms,
                    total_bytes: 0,
                    count: 0,
                };
            }
            probe.last_send_ms = pkt.ts_sent_ms;
            probe.last_rcv_ms = now_ms;
            probe.total_bytes += pkt.size_bytes;
            probe.count += 1;
        }

        let highest = state.highest_seen_id.get_or_insert(pkt.id);
        if pkt.id > *highest {
            let prev_highest = *highest;
            *highest = pkt.id;
            let rtt_estimate_ms = state.owd_ewma.value().unwrap_or(0.0) * 2.0;
            let burst_gap_ms = (state.burst_rtt_multiple * rtt_estimate_ms) as u64;
            if now_ms.saturating_sub(state.last_nack_burst_ms) >= burst_gap_ms {
                let mut any_gap = false;
                for missing_id in (prev_highest + 1)..pkt.id {
                    if state.received_ids.contains(&missing_id) {
                        continue;
                    }
                    let retries = state.nack_retry_counts.entry(missing_id).or_insert(0);
                    if *retries >= state.max_retries {
                        continue;
                    }
                    *retries += 1;
                    any_gap = true;
                    state.lost_since_report += 1;
                    let nack = Packet::new(missing_id, PacketKind::Nack, 40, now_ms);
                    let _ = ack_link.push(nack, rng);
                }
                if any_gap {
                    state.last_nack_burst_ms = now_ms;
                }
            }
        }
    }

    fn maybe_emit_rtcp(
        state: &mut RtpReceiverState,
        now_ms: u64,
        ack_link: &mut Link,
        rng: &mut StdRng,
    ) {
        if now_ms.saturating_sub(state.last_report_ms) < state.report_interval_ms {
            return;
        }
        state.last_report_ms = now_ms;

        let loss_fraction = if state.expected_since_report == 0 {
            None
        } else {
            Some(state.lost_since_report as f64 / state.expected_since_report as f64)
        };
        let throughput_bps = state.bytes_since_report as f64 * 1000.0
            / state.report_interval_ms.max(1) as f64;

        let remb = if now_ms.saturating_sub(state.last_remb_ms) >= state.remb_interval_ms {
            state.last_remb_ms = now_ms;
            Some(state.delay.last_remb_bps())
        } else {
            None
        };

        let probe_info = state.active_probe.take().and_then(|p| {
            if p.count >= 4
                && p.last_rcv_ms.saturating_sub(p.first_rcv_ms) >= state.min_probe_duration_ms
            {
                let send_span_ms = p.last_send_ms.saturating_sub(p.first_send_ms).max(1);
                let rcv_span_ms = p.last_rcv_ms.saturating_sub(p.first_rcv_ms).max(1);
                let sender_observed_rate_bps = p.total_bytes as f64 * 8_000.0 / send_span_ms as f64;
                let receiver_observed_rate_bps = p.total_bytes as f64 * 8_000.0 / rcv_span_ms as f64;
                Some(ProbeInfo {
                    cluster_id: p.cluster_id,
                    first_send_ts_ms: p.first_send_ms,
                    last_send_ts_ms: p.last_send_ms,
                    first_rcv_ts_ms: p.first_rcv_ms,
                    last_rcv_ts_ms: p.last_rcv_ms,
                    total_bytes: p.total_bytes,
                    implied_rate_bps: sender_observed_rate_bps.min(receiver_observed_rate_bps),
                })
            } else {
                None
            }
        });

        state.bytes_since_report = 0;
        state.lost_since_report = 0;
        state.expected_since_report = 0;

        let report = Packet {
            id: 0,
            kind: PacketKind::Rtcp,
            size_bytes: 52,
            prop_delay_ms: 0,
            queue_delay_ms: 0,
            ts_sent_ms: now_ms,
            ts_first_sent_ms: now_ms,
            ts_rcvd_ms: 0,
            app_data: Default::default(),
            extras: AlgorithmExtras::Rtp(RtpExtras {
                estimated_rate_bps: remb,
                loss_fraction,
                owd_ms: state.owd_ewma.value(),
                throughput_bps: Some(throughput_bps),
                probe_info,
            }),
        };
        let _ = ack_link.push(report, rng);
    }

    /// Drains GCC's receiver-side delay-controller telemetry, for
    /// `gcc_log_1.csv`. Empty for every other transport role.
    pub fn take_gcc_delay_log_records(&mut self) -> Vec<crate::congestion::GccDelayLogRecord> {
        match &mut self.role {
            ReceiverRole::Rtp(state) => state.delay.take_log_records(),
            _ => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.app.reset();
    }
}
