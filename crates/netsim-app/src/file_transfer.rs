//! Plain byte-stream transfer: the sender always has a full-MSS packet
//! ready, the receiver has nothing to send back but data acks.

use netsim_core::app::Application;
use netsim_core::packet::{Packet, PacketKind};

pub struct FileSender {
    mss: usize,
    bytes_sent: u64,
}

impl FileSender {
    pub fn new(mss: usize) -> Self {
        FileSender {
            mss,
            bytes_sent: 0,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl Application for FileSender {
    fn tick(&mut self, _now_ms: u64) {}

    fn next_pkt(&mut self, now_ms: u64, budget_bytes: usize) -> Option<Packet> {
        if budget_bytes < self.mss {
            return None;
        }
        self.bytes_sent += self.mss as u64;
        Some(Packet::new(0, PacketKind::Data, self.mss, now_ms))
    }

    fn on_pkt_rcvd(&mut self, _pkt: &Packet, _now_ms: u64) {}

    fn reset(&mut self) {
        self.bytes_sent = 0;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub struct FileReceiver {
    bytes_received: u64,
}

impl FileReceiver {
    pub fn new() -> Self {
        FileReceiver { bytes_received: 0 }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

impl Default for FileReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Application for FileReceiver {
    fn tick(&mut self, _now_ms: u64) {}

    fn next_pkt(&mut self, _now_ms: u64, _budget_bytes: usize) -> Option<Packet> {
        None
    }

    fn on_pkt_rcvd(&mut self, pkt: &Packet, _now_ms: u64) {
        self.bytes_received += pkt.size_bytes as u64;
    }

    fn reset(&mut self) {
        self.bytes_received = 0;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_refuses_when_budget_below_mss() {
        let mut s = FileSender::new(1500);
        assert!(s.next_pkt(0, 1000).is_none());
    }

    #[test]
    fn sender_produces_full_mss_packets() {
        let mut s = FileSender::new(1500);
        let p = s.next_pkt(0, 3000).unwrap();
        assert_eq!(p.size_bytes, 1500);
        assert_eq!(s.bytes_sent(), 1500);
    }

    #[test]
    fn receiver_accumulates_bytes() {
        let mut r = FileReceiver::new();
        let p = Packet::new(1, PacketKind::Data, 1500, 0);
        r.on_pkt_rcvd(&p, 10);
        assert_eq!(r.bytes_received(), 1500);
    }
}
