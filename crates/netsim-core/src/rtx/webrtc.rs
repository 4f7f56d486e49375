//! WebRTC's rtx trigger: driven entirely by NACKs from the peer, with
//! time-based eviction instead of ack-based bookkeeping.

use crate::packet::Packet;

use super::UnackedBuffer;

pub struct WebRtcRtx {
    buf: UnackedBuffer,
    eviction_ms: u64,
}

impl WebRtcRtx {
    pub fn new(eviction_ms: u64) -> Self {
        WebRtcRtx {
            buf: UnackedBuffer::new(),
            eviction_ms,
        }
    }

    pub fn on_pkt_sent(&mut self, pkt: Packet, _now_ms: u64) {
        self.buf.insert(pkt, 0);
    }

    pub fn mark_acked(&mut self, acked_id: u64) {
        self.buf.mark_acked(acked_id);
    }

    pub fn on_nack(&mut self, nacked_id: u64) -> Vec<Packet> {
        if self.buf.enqueue_for_retransmit(nacked_id) {
            self.buf
                .iter()
                .find(|e| e.packet.id == nacked_id)
                .map(|e| vec![e.packet.clone()])
                .unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        let stale: Vec<u64> = self
            .buf
            .iter()
            .filter(|e| now_ms.saturating_sub(e.packet.ts_first_sent_ms) > self.eviction_ms)
            .map(|e| e.packet.id)
            .collect();
        for id in stale {
            self.buf.evict(id);
        }
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketKind;

    #[test]
    fn nack_enqueues_retransmit() {
        let mut rtx = WebRtcRtx::new(20_000);
        rtx.on_pkt_sent(Packet::new(5, PacketKind::Rtp, 100, 0), 0);
        let lost = rtx.on_nack(5);
        assert_eq!(lost.len(), 1);
        assert_eq!(rtx.peek_pkt(), 100);
    }

    #[test]
    fn eviction_removes_stale_entries() {
        let mut rtx = WebRtcRtx::new(20_000);
        rtx.on_pkt_sent(Packet::new(1, PacketKind::Rtp, 100, 0), 0);
        rtx.tick(20_001);
        assert_eq!(rtx.buf.len(), 0);
    }

    #[test]
    fn ack_removes_without_retransmit() {
        let mut rtx = WebRtcRtx::new(20_000);
        rtx.on_pkt_sent(Packet::new(1, PacketKind::Rtp, 100, 0), 0);
        rtx.mark_acked(1);
        assert_eq!(rtx.peek_pkt(), 0);
    }
}
