//! Wires one sender host and one receiver host to a data link and an ACK
//! link and runs the 1ms tick loop (§4.1's dispatch order: data link, ACK
//! link, sender, receiver), collecting every per-run telemetry stream.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use netsim_app::{Decoder, Encoder, EncoderFrameRecord, FileReceiver, FileSender, LookupTable};
use netsim_core::app::Application;
use netsim_core::config::SimConfig;
use netsim_core::congestion::{
    AuroraCc, AuroraMiRecord, Bbr, CongestionControl, Gcc, GccDelayLogRecord, GccSenderLogRecord,
    LinearPolicy, Oracle, Policy, RewardMode, UniformRandomPolicy,
};
use netsim_core::host::{ReceiverHost, ReceiverRole, RtpReceiverState, SenderHost, SenderRole};
use netsim_core::link::Link;
use netsim_core::pacer::{Pacer, PacerLogRecord};
use netsim_core::rtx::{AuroraRtx, RtxManager, TcpRtx, WebRtcRtx};
use netsim_core::stats::Ewma;
use netsim_core::trace::Trace;

use crate::cli::{AppChoice, CcChoice, SimulateArgs};
use crate::error::RunError;
use crate::output::PktLogRow;
use crate::scenario::{build_scenario_trace, ScenarioConfig};

/// Video streaming runs at a fixed 25fps — the rate every encoder/decoder
/// unit test in this workspace assumes.
const VIDEO_FPS: f64 = 25.0;

/// Distinct RNG substream for the policy/scenario draws, so varying the
/// main simulation's packet-loss draws never perturbs the policy (or
/// vice versa) for the same `--seed`.
const POLICY_SEED_SALT: u64 = 0x706f_6c69_6379;
const SCENARIO_SEED_SALT: u64 = 0x7363_656e_6172;

pub struct RunOutputs {
    pub pkt_log: Vec<PktLogRow>,
    pub decoder_log: Vec<netsim_app::DecoderFrameRecord>,
    pub encoder_log: Vec<EncoderFrameRecord>,
    pub aurora_mi_log: Vec<AuroraMiRecord>,
    pub gcc_sender_log: Vec<GccSenderLogRecord>,
    pub gcc_delay_log: Vec<GccDelayLogRecord>,
    pub pacer_log: Vec<PacerLogRecord>,
}

pub struct Simulator {
    tx_link: Link,
    ack_link: Link,
    sender: SenderHost,
    receiver: ReceiverHost,
    rng: StdRng,
    duration_ms: u64,
}

impl Simulator {
    pub fn build(args: &SimulateArgs) -> Result<Self, RunError> {
        let config = SimConfig::default();
        let rng = StdRng::seed_from_u64(args.seed);

        let cc_choice: CcChoice = args
            .cc
            .parse()
            .map_err(|_| RunError::UnknownCc(args.cc.clone()))?;
        let app_choice: AppChoice = args
            .app
            .parse()
            .map_err(|_| RunError::UnknownApp(args.app.clone()))?;

        let trace = match &args.trace {
            Some(path) => Trace::load(path)?,
            None => {
                let mut scenario_rng = StdRng::seed_from_u64(args.seed ^ SCENARIO_SEED_SALT);
                let scenario_cfg = ScenarioConfig {
                    seed: args.seed,
                    duration_sec: args.duration_sec as f64,
                    ..ScenarioConfig::default()
                };
                build_scenario_trace(&scenario_cfg, &mut scenario_rng)
            }
        };

        let lookup_table = match &args.lookup_table {
            Some(path) => Some(Arc::new(LookupTable::load(path)?)),
            None => None,
        };
        if app_choice == AppChoice::VideoStreaming && lookup_table.is_none() {
            return Err(RunError::MissingLookupTable);
        }

        let mss = config.mss;
        let init_rate_bps = trace.bandwidth_at(0.0) / 8.0;
        let queue_cap_bytes = trace.queue_size_packets as usize * mss;

        let tx_link = Link::new_data_link(1, trace.clone(), queue_cap_bytes, mss);
        let ack_link = Link::new_ack_link(2, trace.min_delay_ms, mss);

        let (cc, rtx, sender_role) = build_sender_transport(cc_choice, &config, &trace, init_rate_bps, args)?;
        let receiver_role = build_receiver_role(cc_choice, &config);

        let pacer = Pacer::new(config.pacer_capacity_mss * mss, config.pacing_rate_update_step_ms);

        let (sender_app, receiver_app): (Box<dyn Application>, Box<dyn Application>) = match app_choice {
            AppChoice::FileTransfer => (
                Box::new(FileSender::new(mss)),
                Box::new(FileReceiver::new()),
            ),
            AppChoice::VideoStreaming => {
                let table = lookup_table.expect("checked above");
                (
                    Box::new(Encoder::new(table.clone(), VIDEO_FPS, mss, config.min_pkts_per_frame)),
                    Box::new(Decoder::new(
                        table,
                        VIDEO_FPS,
                        mss,
                        config.min_pkts_per_frame,
                        config.decoder_frame_history_cap,
                    )),
                )
            }
        };

        let sender = SenderHost::new(cc, rtx, pacer, sender_app, sender_role, &config);
        let receiver = ReceiverHost::new(receiver_app, receiver_role);

        Ok(Simulator {
            tx_link,
            ack_link,
            sender,
            receiver,
            rng,
            duration_ms: args.duration_sec * 1000,
        })
    }

    /// Runs the tick loop to completion and drains every telemetry stream.
    pub fn run(mut self) -> Result<RunOutputs, RunError> {
        let mut pkt_log = Vec::new();
        let mut decoder_log = Vec::new();
        let mut encoder_log = Vec::new();
        let mut aurora_mi_log = Vec::new();
        let mut gcc_sender_log = Vec::new();
        let mut gcc_delay_log = Vec::new();
        let mut pacer_log = Vec::new();

        for now_ms in 0..self.duration_ms {
            self.tx_link.tick(now_ms)?;
            self.ack_link.tick(now_ms)?;
            self.sender.tick(now_ms, &mut self.tx_link, &mut self.ack_link, &mut self.rng)?;
            let frame_events =
                self.receiver
                    .tick(now_ms, &mut self.tx_link, &mut self.ack_link, &mut self.rng);
            for event in frame_events {
                self.sender.on_frame_decoded(event.frame_quality, event.avg_delay_sec);
            }

            pacer_log.extend(self.sender.take_pacer_log_records());
            aurora_mi_log.extend(self.sender.cc.take_aurora_mi_records());
            gcc_sender_log.extend(self.sender.cc.take_gcc_sender_log_records());
            gcc_delay_log.extend(self.receiver.take_gcc_delay_log_records());

            if let Some(decoder) = self.receiver.app_mut().as_any_mut().downcast_mut::<Decoder>() {
                decoder_log.extend(decoder.take_new_records());
            }
        }

        if let Some(encoder) = self.sender.app_mut().as_any_mut().downcast_mut::<Encoder>() {
            encoder_log.extend(encoder.records().iter().cloned());
        }

        pkt_log.extend(self.sender.stats_mut().drain().into_iter().map(|e| PktLogRow::new("sender", e)));
        pkt_log.extend(self.receiver.stats_mut().drain().into_iter().map(|e| PktLogRow::new("receiver", e)));

        Ok(RunOutputs {
            pkt_log,
            decoder_log,
            encoder_log,
            aurora_mi_log,
            gcc_sender_log,
            gcc_delay_log,
            pacer_log,
        })
    }
}

fn build_sender_transport(
    cc_choice: CcChoice,
    config: &SimConfig,
    trace: &Trace,
    init_rate_bps: f64,
    args: &SimulateArgs,
) -> Result<(CongestionControl, RtxManager, SenderRole), RunError> {
    Ok(match cc_choice {
        CcChoice::Aurora => {
            let mode = if args.ae_guided {
                RewardMode::AppAware
            } else {
                RewardMode::Classical
            };
            let policy: Box<dyn Policy + Send> = match &args.model {
                Some(path) => Box::new(LinearPolicy::load(path)?),
                None => Box::new(UniformRandomPolicy::new(StdRng::seed_from_u64(
                    args.seed ^ POLICY_SEED_SALT,
                ))),
            };
            let cc = CongestionControl::Aurora(AuroraCc::new(
                mode,
                init_rate_bps,
                config.aurora_rate_min_bps,
                config.aurora_rate_max_bps,
                config.aurora_history_len,
                config.aurora_mi_max_duration_ms,
                policy,
            ));
            let rtx = RtxManager::Aurora(AuroraRtx::new(config.rto_min_ms, config.rto_max_ms));
            (cc, rtx, SenderRole::Aurora)
        }
        CcChoice::Oracle | CcChoice::OracleNoPredict => {
            let predict = cc_choice == CcChoice::Oracle;
            let cc = CongestionControl::Oracle(Oracle::new(trace.clone(), predict));
            let rtx = RtxManager::Aurora(AuroraRtx::new(config.rto_min_ms, config.rto_max_ms));
            (cc, rtx, SenderRole::Aurora)
        }
        CcChoice::Bbr => {
            let cc = CongestionControl::Bbr(Bbr::new(config.mss, init_rate_bps));
            let rtx = RtxManager::Tcp(TcpRtx::new(config.rto_min_ms, config.rto_max_ms));
            let role = SenderRole::Tcp {
                srtt_ms: Ewma::new(1.0 / 8.0),
                rttvar_ms: Ewma::new(1.0 / 4.0),
                min_rtt_ms: None,
            };
            (cc, rtx, role)
        }
        CcChoice::Gcc => {
            let cc = CongestionControl::Gcc(Gcc::new());
            let rtx = RtxManager::WebRtc(WebRtcRtx::new(config.webrtc_rtx_eviction_ms));
            (cc, rtx, SenderRole::Rtp)
        }
    })
}

fn build_receiver_role(cc_choice: CcChoice, config: &SimConfig) -> ReceiverRole {
    match cc_choice {
        CcChoice::Aurora | CcChoice::Oracle | CcChoice::OracleNoPredict => ReceiverRole::Aurora,
        CcChoice::Bbr => ReceiverRole::Tcp,
        CcChoice::Gcc => ReceiverRole::Rtp(Box::new(RtpReceiverState::new(config))),
    }
}
