//! Classical TCP rtx: fast-retransmit on dup-ack plus an RTO queue, kept
//! distinct from Aurora's so BBR gets a conventional loss signal.

use crate::packet::Packet;
use crate::stats::Ewma;

use super::UnackedBuffer;

const FAST_RETRANSMIT_DUP_ACKS: u32 = 3;

pub struct TcpRtx {
    buf: UnackedBuffer,
    srtt_ms: Ewma,
    rttvar_ms: Ewma,
    rto_ms: u64,
    rto_min_ms: u64,
    rto_max_ms: u64,
    dup_ack_counts: std::collections::HashMap<u64, u32>,
}

impl TcpRtx {
    pub fn new(rto_min_ms: u64, rto_max_ms: u64) -> Self {
        TcpRtx {
            buf: UnackedBuffer::new(),
            srtt_ms: Ewma::new(1.0 / 8.0),
            rttvar_ms: Ewma::new(1.0 / 4.0),
            rto_ms: rto_max_ms.min(3000).max(rto_min_ms),
            rto_min_ms,
            rto_max_ms,
            dup_ack_counts: std::collections::HashMap::new(),
        }
    }

    pub fn on_pkt_sent(&mut self, pkt: Packet, _now_ms: u64) {
        self.buf.insert(pkt, self.rto_ms);
    }

    pub fn on_ack(&mut self, acked_id: u64, rtt_ms: u64, _now_ms: u64) -> Vec<Packet> {
        self.buf.mark_acked(acked_id);
        self.dup_ack_counts.remove(&acked_id);

        let srtt = self.srtt_ms.update(rtt_ms as f64);
        let dev = (rtt_ms as f64 - srtt).abs();
        let rttvar = self.rttvar_ms.update(dev);
        self.rto_ms =
            ((srtt + 4.0 * rttvar).round() as u64).clamp(self.rto_min_ms, self.rto_max_ms);

        let mut lost = Vec::new();
        for id in self.buf.ids_below(acked_id) {
            let count = self.dup_ack_counts.entry(id).or_insert(0);
            *count += 1;
            if *count >= FAST_RETRANSMIT_DUP_ACKS && self.buf.enqueue_for_retransmit(id) {
                if let Some(e) = self.buf.iter().find(|e| e.packet.id == id) {
                    lost.push(e.packet.clone());
                }
            }
        }
        lost
    }

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
        self.dup_ack_counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketKind;

    #[test]
    fn three_dup_acks_trigger_fast_retransmit() {
        let mut rtx = TcpRtx::new(1000, 60_000);
        rtx.on_pkt_sent(Packet::new(1, PacketKind::TcpData, 100, 0), 0);
        rtx.on_pkt_sent(Packet::new(2, PacketKind::TcpData, 100, 0), 0);
        for ack_t in [10, 20, 30] {
            rtx.on_ack(2, 10, ack_t);
        }
        assert_eq!(rtx.peek_pkt(), 100);
    }

    #[test]
    fn rto_triggers_after_timeout() {
        let mut rtx = TcpRtx::new(1000, 60_000);
        rtx.on_pkt_sent(Packet::new(1, PacketKind::TcpData, 100, 0), 0);
        let lost = rtx.tick(5000);
        assert_eq!(lost.len(), 1);
    }
}
