//! # Packet — the uniform transport envelope
//!
//! Every packet on the wire, regardless of which transport produced it,
//! shares this envelope. Algorithm-specific fields (BBR's delivery-rate
//! bookkeeping, RTP/RTCP's rate and probe metadata) live behind
//! [`AlgorithmExtras`] rather than bloating the common header.

use std::fmt;

/// What kind of payload a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Data,
    Ack,
    Rtp,
    Rtcp,
    Nack,
    BbrData,
    TcpData,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketKind::Data => "DATA",
            PacketKind::Ack => "ACK",
            PacketKind::Rtp => "RTP",
            PacketKind::Rtcp => "RTCP",
            PacketKind::Nack => "NACK",
            PacketKind::BbrData => "BBR-DATA",
            PacketKind::TcpData => "TCP-DATA",
        };
        write!(f, "{s}")
    }
}

/// Free-form application payload carried alongside the wire header.
///
/// Only the fields a given application actually populates are `Some`;
/// everything else is left at its default.
#[derive(Debug, Clone, Default)]
pub struct AppData {
    pub frame_id: Option<u64>,
    pub frame_size_bytes: Option<usize>,
    pub model_id: Option<u32>,
    pub padding: bool,
    pub probe_cluster_id: Option<u64>,
}

/// A rate-sample-relevant snapshot carried on BBR/TCP data and ack packets.
#[derive(Debug, Clone, Default)]
pub struct BbrExtras {
    pub delivered_byte: u64,
    pub delivered_time_ms: u64,
    pub first_sent_time_ms: u64,
    pub is_app_limited: bool,
}

/// Metadata carried on RTP/RTCP packets for GCC.
#[derive(Debug, Clone, Default)]
pub struct RtpExtras {
    pub estimated_rate_bps: Option<f64>,
    pub loss_fraction: Option<f64>,
    pub owd_ms: Option<f64>,
    pub throughput_bps: Option<f64>,
    pub probe_info: Option<ProbeInfo>,
}

/// A probe cluster summary attached to an RTCP report.
///
/// `implied_rate_bps` is the receiver's capacity estimate for the cluster:
/// `min(sender_observed_rate, receiver_observed_rate)`, computed from the
/// send- and receive-side spans over the same `total_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct ProbeInfo {
    pub cluster_id: u64,
    pub first_send_ts_ms: u64,
    pub last_send_ts_ms: u64,
    pub first_rcv_ts_ms: u64,
    pub last_rcv_ts_ms: u64,
    pub total_bytes: usize,
    pub implied_rate_bps: f64,
}

/// An ACK's reference back to the data packet it acknowledges.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckExtras {
    pub acked_size_bytes: usize,
    pub orig_ts_sent_ms: u64,
}

/// Algorithm-specific packet metadata, attached by the sender's CC.
#[derive(Debug, Clone)]
pub enum AlgorithmExtras {
    None,
    Bbr(BbrExtras),
    Rtp(RtpExtras),
    Ack(AckExtras),
}

impl Default for AlgorithmExtras {
    fn default() -> Self {
        AlgorithmExtras::None
    }
}

/// The uniform packet envelope.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Monotonic per-sender id, assigned when first sent (unchanged on rtx).
    pub id: u64,
    pub kind: PacketKind,
    pub size_bytes: usize,
    pub prop_delay_ms: u64,
    pub queue_delay_ms: u64,
    pub ts_sent_ms: u64,
    pub ts_first_sent_ms: u64,
    pub ts_rcvd_ms: u64,
    pub app_data: AppData,
    pub extras: AlgorithmExtras,
}

impl Packet {
    pub fn new(id: u64, kind: PacketKind, size_bytes: usize, ts_ms: u64) -> Self {
        Packet {
            id,
            kind,
            size_bytes,
            prop_delay_ms: 0,
            queue_delay_ms: 0,
            ts_sent_ms: ts_ms,
            ts_first_sent_ms: ts_ms,
            ts_rcvd_ms: 0,
            app_data: AppData::default(),
            extras: AlgorithmExtras::None,
        }
    }

    /// Total delay accumulated on the link (propagation + queueing).
    pub fn cur_delay_ms(&self) -> u64 {
        self.prop_delay_ms + self.queue_delay_ms
    }

    /// Round-trip time implied by an ACK's timestamps: `now - orig_send`.
    pub fn rtt_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.ts_first_sent_ms)
    }

    /// Re-stamp for a retransmission: `ts_sent_ms` advances, `ts_first_sent_ms`
    /// and `id` do not.
    pub fn mark_resent(&mut self, now_ms: u64) {
        self.ts_sent_ms = now_ms;
        self.prop_delay_ms = 0;
        self.queue_delay_ms = 0;
    }

    /// Whether this packet is permitted to exceed MSS (padding/probe path).
    pub fn is_oversize_exempt(&self) -> bool {
        self.app_data.padding || self.app_data.probe_cluster_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_packet_first_sent_matches_sent() {
        let p = Packet::new(1, PacketKind::Data, 100, 500);
        assert_eq!(p.ts_sent_ms, p.ts_first_sent_ms);
    }

    #[test]
    fn mark_resent_keeps_first_sent_and_id() {
        let mut p = Packet::new(7, PacketKind::Data, 100, 0);
        p.ts_first_sent_ms = 0;
        p.mark_resent(200);
        assert_eq!(p.id, 7);
        assert_eq!(p.ts_first_sent_ms, 0);
        assert_eq!(p.ts_sent_ms, 200);
        assert_eq!(p.queue_delay_ms, 0);
    }

    #[test]
    fn cur_delay_sums_prop_and_queue() {
        let mut p = Packet::new(1, PacketKind::Data, 100, 0);
        p.prop_delay_ms = 25;
        p.queue_delay_ms = 10;
        assert_eq!(p.cur_delay_ms(), 35);
    }

    #[test]
    fn padding_packet_is_oversize_exempt() {
        let mut p = Packet::new(1, PacketKind::Data, 100, 0);
        p.app_data.padding = true;
        assert!(p.is_oversize_exempt());
    }
}
