//! Video frame decoder: accumulates packets keyed by `frame_id` and, once
//! a frame is decodable, emits a frame record plus the frame-level timing
//! the sender's congestion controller needs.

use std::collections::BTreeMap;
use std::sync::Arc;

use netsim_core::app::{Application, FrameEvent};
use netsim_core::packet::Packet;

use crate::lookup::LookupTable;

#[derive(Debug, Clone, Default)]
struct FrameAccum {
    frame_size_bytes: usize,
    model_id: u32,
    bytes_received: usize,
    num_pkts_received: usize,
    first_pkt_sent_ts_ms: u64,
    last_pkt_sent_ts_ms: u64,
    first_pkt_rcv_ts_ms: u64,
    last_pkt_rcv_ts_ms: u64,
}

/// One decoded frame, as recorded for the run's `decoder_log.csv` and as
/// fed back to the sender's congestion controller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DecoderFrameRecord {
    pub frame_id: u64,
    pub frame_size_bytes: usize,
    pub bytes_received: usize,
    pub num_pkts: usize,
    pub num_pkts_received: usize,
    pub model_id: u32,
    pub frame_loss_rate: f64,
    pub ssim: f64,
    pub first_pkt_sent_ts_ms: u64,
    pub last_pkt_sent_ts_ms: u64,
    pub first_pkt_rcv_ts_ms: u64,
    pub last_pkt_rcv_ts_ms: u64,
}

impl DecoderFrameRecord {
    /// SSIM doubles as the "frame quality" Aurora's app-aware reward wants.
    pub fn frame_quality(&self) -> f32 {
        self.ssim as f32
    }

    /// Approximates the frame's end-to-end delay for the app-aware reward:
    /// last packet received minus last packet sent, in seconds.
    pub fn avg_delay_sec(&self) -> f64 {
        (self
            .last_pkt_rcv_ts_ms
            .saturating_sub(self.last_pkt_sent_ts_ms)) as f64
            / 1000.0
    }
}

pub struct Decoder {
    fps: f64,
    mss: usize,
    min_pkts_per_frame: usize,
    table: Arc<LookupTable>,
    history_cap: u64,
    frame_id: u64,
    decoded_count: u64,
    first_decode_ts_ms: Option<u64>,
    frames: BTreeMap<u64, FrameAccum>,
    pending_records: Vec<DecoderFrameRecord>,
    pending_frame_events: Vec<FrameEvent>,
}

impl Decoder {
    pub fn new(
        table: Arc<LookupTable>,
        fps: f64,
        mss: usize,
        min_pkts_per_frame: usize,
        history_cap: u64,
    ) -> Self {
        Decoder {
            fps,
            mss,
            min_pkts_per_frame,
            table,
            history_cap,
            frame_id: 1,
            decoded_count: 0,
            first_decode_ts_ms: None,
            frames: BTreeMap::new(),
            pending_records: Vec::new(),
            pending_frame_events: Vec::new(),
        }
    }

    /// Drains frame records produced since the last call, for CSV output
    /// and for wiring into the sender-side congestion controller.
    pub fn take_new_records(&mut self) -> Vec<DecoderFrameRecord> {
        std::mem::take(&mut self.pending_records)
    }

    fn n_pkts_for(&self, size_bytes: usize) -> usize {
        let chunks = size_bytes.div_ceil(self.mss).max(1);
        chunks.max(self.min_pkts_per_frame)
    }

    fn evict_old(&mut self) {
        while self.frames.len() as u64 > self.history_cap {
            if let Some(&oldest) = self.frames.keys().next() {
                self.frames.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn try_decode(&mut self, now_ms: u64) {
        let frame_period_ms = (1000.0 / self.fps).round().max(1.0) as u64;
        loop {
            let Some(first_ts) = self.first_decode_ts_ms else {
                break;
            };
            let deadline = first_ts + (self.frame_id as f64 * 1000.0 / self.fps).round() as u64;
            if now_ms < deadline {
                break;
            }

            let prev_frame_ok = self.decoded_count > 0 || self.frame_id <= 1;
            let accum = self.frames.get(&self.frame_id).cloned();
            let bytes_ok = accum
                .as_ref()
                .map(|a| a.frame_size_bytes > 0 && a.bytes_received as f64 / a.frame_size_bytes as f64 >= 0.1)
                .unwrap_or(false);

            if prev_frame_ok && bytes_ok {
                let a = accum.unwrap();
                let frame_loss_rate =
                    (1.0 - a.bytes_received as f64 / a.frame_size_bytes as f64).clamp(0.0, 1.0);
                let ssim = self
                    .table
                    .entry(self.frame_id, a.model_id, frame_loss_rate)
                    .map(|e| e.ssim)
                    .unwrap_or(0.0);
                let record = DecoderFrameRecord {
                    frame_id: self.frame_id,
                    frame_size_bytes: a.frame_size_bytes,
                    bytes_received: a.bytes_received,
                    num_pkts: self.n_pkts_for(a.frame_size_bytes),
                    num_pkts_received: a.num_pkts_received,
                    model_id: a.model_id,
                    frame_loss_rate,
                    ssim,
                    first_pkt_sent_ts_ms: a.first_pkt_sent_ts_ms,
                    last_pkt_sent_ts_ms: a.last_pkt_sent_ts_ms,
                    first_pkt_rcv_ts_ms: a.first_pkt_rcv_ts_ms,
                    last_pkt_rcv_ts_ms: a.last_pkt_rcv_ts_ms,
                };
                let recv_span_ms = a
                    .last_pkt_rcv_ts_ms
                    .saturating_sub(a.first_pkt_rcv_ts_ms)
                    .max(1);
                self.pending_frame_events.push(FrameEvent {
                    frame_id: record.frame_id,
                    last_pkt_sent_ms: record.last_pkt_sent_ts_ms,
                    last_pkt_rcv_ms: record.last_pkt_rcv_ts_ms,
                    recv_rate_bps: record.bytes_received as f64 * 8.0 / (recv_span_ms as f64 / 1000.0),
                    frame_quality: record.frame_quality(),
                    avg_delay_sec: record.avg_delay_sec(),
                });
                self.pending_records.push(record);
                self.frames.remove(&self.frame_id);
                self.decoded_count += 1;
                self.frame_id = (self.frame_id + 1) % self.table.n_frames();
                self.evict_old();
                continue;
            }

            // Total loss or never arrived: give it one extra frame period of
            // grace, then skip forward so the pipeline never stalls.
            if now_ms >= deadline + frame_period_ms {
                self.frames.remove(&self.frame_id);
                self.decoded_count += 1;
                self.frame_id = (self.frame_id + 1) % self.table.n_frames();
                self.evict_old();
                continue;
            }
            break;
        }
    }
}

impl Application for Decoder {
    fn tick(&mut self, now_ms: u64) {
        self.try_decode(now_ms);
    }

    fn next_pkt(&mut self, _now_ms: u64, _budget_bytes: usize) -> Option<Packet> {
        None
    }

    fn on_pkt_rcvd(&mut self, pkt: &Packet, now_ms: u64) {
        if pkt.app_data.padding {
            return;
        }
        let Some(fid) = pkt.app_data.frame_id else {
            return;
        };
        if fid < self.frame_id && self.decoded_count > 0 {
            // arrived after its frame was already decoded/skipped
            return;
        }
        self.first_decode_ts_ms.get_or_insert(now_ms);

        let frame_size_bytes = pkt.app_data.frame_size_bytes.unwrap_or(0);
        let model_id = pkt.app_data.model_id.unwrap_or(0);
        let accum = self.frames.entry(fid).or_insert_with(|| FrameAccum {
            frame_size_bytes,
            model_id,
            first_pkt_sent_ts_ms: pkt.ts_sent_ms,
            last_pkt_sent_ts_ms: pkt.ts_sent_ms,
            first_pkt_rcv_ts_ms: now_ms,
            last_pkt_rcv_ts_ms: now_ms,
            ..Default::default()
        });
        accum.bytes_received += pkt.size_bytes;
        accum.num_pkts_received += 1;
        accum.first_pkt_sent_ts_ms = accum.first_pkt_sent_ts_ms.min(pkt.ts_sent_ms);
        accum.last_pkt_sent_ts_ms = accum.last_pkt_sent_ts_ms.max(pkt.ts_sent_ms);
        accum.first_pkt_rcv_ts_ms = accum.first_pkt_rcv_ts_ms.min(now_ms);
        accum.last_pkt_rcv_ts_ms = accum.last_pkt_rcv_ts_ms.max(now_ms);
    }

    fn reset(&mut self) {
        self.frame_id = 1;
        self.decoded_count = 0;
        self.first_decode_ts_ms = None;
        self.frames.clear();
        self.pending_records.clear();
        self.pending_frame_events.clear();
    }

    fn take_frame_events(&mut self) -> Vec<FrameEvent> {
        std::mem::take(&mut self.pending_frame_events)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
