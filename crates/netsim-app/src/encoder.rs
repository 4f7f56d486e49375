//! Video frame encoder: turns a target bitrate into lookup-table rows,
//! chopped into MSS-sized packets plus padding to exactly fill the budget.

use std::collections::VecDeque;
use std::sync::Arc;

use netsim_core::app::Application;
use netsim_core::packet::{AppData, Packet, PacketKind};

use crate::lookup::LookupTable;
use crate::rate_allocator::RateAllocator;

/// One encoded frame, as recorded for the run's `encoder_log.csv`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EncoderFrameRecord {
    pub frame_id: u64,
    pub target_bitrate_bps: f64,
    pub model_id: u32,
    pub frame_size_bytes: usize,
    pub encode_ts_ms: u64,
    pub n_pkts: usize,
    pub padding_bytes: usize,
}

pub struct Encoder {
    fps: f64,
    mss: usize,
    min_pkts_per_frame: usize,
    table: Arc<LookupTable>,
    frame_id: u64,
    last_encode_ts_ms: i64,
    pkt_queue: VecDeque<Packet>,
    allocator: RateAllocator,
    pacing_rate_bps: f64,
    pending_rtx_bytes: usize,
    update_step_ms: u64,
    records: Vec<EncoderFrameRecord>,
}

impl Encoder {
    pub fn new(table: Arc<LookupTable>, fps: f64, mss: usize, min_pkts_per_frame: usize) -> Self {
        Encoder {
            fps,
            mss,
            min_pkts_per_frame,
            table,
            frame_id: 0,
            last_encode_ts_ms: -1,
            pkt_queue: VecDeque::new(),
            allocator: RateAllocator::new(fps),
            pacing_rate_bps: 0.0,
            pending_rtx_bytes: 0,
            update_step_ms: 40,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[EncoderFrameRecord] {
        &self.records
    }

    fn app_queue_bytes(&self) -> usize {
        self.pkt_queue.iter().map(|p| p.size_bytes).sum()
    }

    fn n_pkts_for(&self, size_bytes: usize) -> usize {
        let chunks = size_bytes.div_ceil(self.mss).max(1);
        chunks.max(self.min_pkts_per_frame)
    }

    fn encode(&mut self, ts_ms: u64) {
        let target_bitrate_bps = self.allocator.target_encode_bitrate_bps(
            self.pacing_rate_bps,
            self.update_step_ms,
            self.pending_rtx_bytes,
            self.app_queue_bytes(),
        );
        let target_fsize_bytes = (target_bitrate_bps / self.fps).max(0.0) as usize;

        let (model_id, entry) = match self.table.best_model_for_target(self.frame_id, target_fsize_bytes) {
            Ok(v) => v,
            Err(_) => return,
        };
        let frame_size_bytes = entry.size_bytes;
        let n_pkts = self.n_pkts_for(frame_size_bytes);

        let base = frame_size_bytes / n_pkts;
        let rem = frame_size_bytes % n_pkts;
        for i in 0..n_pkts {
            let pkt_size = if i < rem { base + 1 } else { base };
            if pkt_size == 0 {
                continue;
            }
            let mut pkt = Packet::new(0, PacketKind::Data, pkt_size, ts_ms);
            pkt.app_data = AppData {
                frame_id: Some(self.frame_id),
                frame_size_bytes: Some(frame_size_bytes),
                model_id: Some(model_id),
                padding: false,
                probe_cluster_id: None,
            };
            self.pkt_queue.push_back(pkt);
        }

        let padding_bytes = target_fsize_bytes.saturating_sub(frame_size_bytes);
        if padding_bytes > 0 {
            let mut pad = Packet::new(0, PacketKind::Data, padding_bytes, ts_ms);
            pad.app_data = AppData {
                frame_id: Some(self.frame_id),
                frame_size_bytes: Some(frame_size_bytes),
                model_id: Some(model_id),
                padding: true,
                probe_cluster_id: None,
            };
            self.pkt_queue.push_back(pad);
        }

        self.records.push(EncoderFrameRecord {
            frame_id: self.frame_id,
            target_bitrate_bps,
            model_id,
            frame_size_bytes,
            encode_ts_ms: ts_ms,
            n_pkts,
            padding_bytes,
        });
    }
}

impl Application for Encoder {
    fn tick(&mut self, now_ms: u64) {
        let frame_period_ms = 1000.0 / self.fps;
        if now_ms as f64 - self.last_encode_ts_ms as f64 > frame_period_ms {
            self.frame_id = (self.frame_id + 1) % self.table.n_frames();
            self.encode(now_ms);
            self.last_encode_ts_ms = now_ms as i64;
        }
    }

    fn next_pkt(&mut self, now_ms: u64, budget_bytes: usize) -> Option<Packet> {
        let front_fits = self.pkt_queue.front().is_some_and(|p| p.size_bytes <= budget_bytes);
        if !front_fits {
            return None;
        }
        let mut pkt = self.pkt_queue.pop_front()?;
        pkt.ts_sent_ms = now_ms;
        pkt.ts_first_sent_ms = now_ms;
        Some(pkt)
    }

    fn on_pkt_rcvd(&mut self, _pkt: &Packet, _now_ms: u64) {}

    fn reset(&mut self) {
        self.frame_id = 0;
        self.last_encode_ts_ms = -1;
        self.pkt_queue.clear();
    }

    fn on_budget_update(&mut self, pacing_rate_bps: f64, pending_rtx_bytes: usize, update_step_ms: u64) {
        self.pacing_rate_bps = pacing_rate_bps;
        self.pending_rtx_bytes = pending_rtx_bytes;
        self.update_step_ms = update_step_ms;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
