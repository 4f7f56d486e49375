//! Aurora's rtx trigger: duplicate-ack (lower unacked id than the one just
//! acked) or RTO expiry, whichever comes first.

use crate::packet::Packet;
use crate::stats::Ewma;

use super::UnackedBuffer;

pub struct AuroraRtx {
    buf: UnackedBuffer,
    srtt_ms: Ewma,
    rttvar_ms: Ewma,
    rto_ms: u64,
    rto_min_ms: u64,
    rto_max_ms: u64,
}

impl AuroraRtx {
    pub fn new(rto_min_ms: u64, rto_max_ms: u64) -> Self {
        AuroraRtx {
            buf: UnackedBuffer::new(),
            srtt_ms: Ewma::new(1.0 / 8.0),
            rttvar_ms: Ewma::new(1.0 / 4.0),
            rto_ms: rto_max_ms.min(3000).max(rto_min_ms),
            rto_min_ms,
            rto_max_ms,
        }
    }

    pub fn on_pkt_sent(&mut self, pkt: Packet, _now_ms: u64) {
        self.buf.insert(pkt, self.rto_ms);
    }

    pub fn on_ack(&mut self, acked_id: u64, rtt_ms: u64, now_ms: u64) -> Vec<Packet> {
        self.buf.mark_acked(acked_id);

        let srtt = self.srtt_ms.update(rtt_ms as f64);
        let dev = (rtt_ms as f64 - srtt).abs();
        let rttvar = self.rttvar_ms.update(dev);
        self.rto_ms = ((srtt + 4.0 * rttvar).round() as u64)
            .clamp(self.rto_min_ms, self.rto_max_ms);

        let mut lost = Vec::new();
        for id in self.buf.ids_below(acked_id) {
            let age_ms = self
                .buf
                .iter()
                .find(|e| e.packet.id == id)
                .map(|e| now_ms.saturating_sub(e.packet.ts_sent_ms))
                .unwrap_or(0);
            let is_dup_ack_lost = true; // any lower unacked id is a dup-ack signal
            let is_rto_lost = age_ms > self.rto_ms;
            if is_dup_ack_lost || is_rto_lost {
                if self.buf.enqueue_for_retransmit(id) {
                    if let Some(e) = self.buf.iter().find(|e| e.packet.id == id) {
                        lost.push(e.packet.clone());
                    }
                }
            }
        }
        lost
    }

    /// Age-based loss detection, run every tick independent of new acks.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Packet> {
        let rto = self.rto_ms;
        let stale: Vec<u64> = self
            .buf
            .iter()
            .filter(|e| !e.acked && now_ms.saturating_sub(e.packet.ts_sent_ms) > rto)
            .map(|e| e.packet.id)
            .collect();
        let mut lost = Vec::new();
        for id in stale {
            if self.buf.enqueue_for_retransmit(id) {
                if let Some(e) = self.buf.iter().find(|e| e.packet.id == id) {
                    lost.push(e.packet.clone());
                }
            }
        }
        lost
    }

    pub fn peek_pkt(&self) -> usize {
        self.buf.peek_size()
    }

    pub fn pending_bytes(&self) -> usize {
        self.buf.total_queued_bytes()
    }

    pub fn get_pkt(&mut self) -> Option<Packet> {
        self.buf.get_pkt()
    }

    pub fn reset(&mut self) {
        self.buf = UnackedBuffer::new();
        self.srtt_ms.reset();
        self.rttvar_ms.reset();
    }
}
