//! Exercises the receiver-side probe-cluster accounting that backs GCC's
//! bandwidth probing: tags a back-to-back burst of packets with a shared
//! `probe_cluster_id` the way `Gcc::on_pkt_to_send` does, and checks the
//! next RTCP report off the wire carries a `probe_info` whose implied rate
//! reflects the bottleneck bandwidth the burst actually drained through.

use std::any::Any;

use rand::rngs::StdRng;
use rand::SeedableRng;

use netsim_core::app::Application;
use netsim_core::config::SimConfig;
use netsim_core::host::{ReceiverHost, ReceiverRole, RtpReceiverState};
use netsim_core::link::Link;
use netsim_core::packet::{AlgorithmExtras, Packet, PacketKind};
use netsim_core::trace::Trace;

struct SinkApp;

impl Application for SinkApp {
    fn tick(&mut self, _now_ms: u64) {}
    fn next_pkt(&mut self, _now_ms: u64, _budget_bytes: usize) -> Option<Packet> {
        None
    }
    fn on_pkt_rcvd(&mut self, _pkt: &Packet, _now_ms: u64) {}
    fn reset(&mut self) {}
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A probe cluster is only meaningful when it's actually the bottleneck, so
/// this pushes the whole burst in one instant and lets the link's own
/// drain-rate accounting spread the arrivals out — the same mechanism a real
/// bandwidth probe relies on to reveal the link's capacity.
#[test]
fn probe_cluster_implied_rate_tracks_the_link_s_bandwidth() {
    let config = SimConfig {
        // Keep the periodic report from firing mid-burst and truncating the
        // cluster's accounted span.
        rtcp_report_interval_ms: 200,
        ..SimConfig::default()
    };
    let mss = 1500;
    let trace_bandwidth_mbps = 8.0;
    let trace = Trace::constant(trace_bandwidth_mbps, 5, 0.0, 1000, 1.0);
    let mut rx_link = Link::new_data_link(1, trace.clone(), 1_000_000, mss);
    let mut ack_link = Link::new_ack_link(2, trace.min_delay_ms, mss);

    let mut receiver = ReceiverHost::new(
        Box::new(SinkApp),
        ReceiverRole::Rtp(Box::new(RtpReceiverState::new(&config))),
    );
    let mut rng = StdRng::seed_from_u64(11);

    let cluster_id = 42u64;
    const PACKET_COUNT: u64 = 50;
    const PACKET_SIZE: usize = 1500;

    for i in 0..PACKET_COUNT {
        let mut pkt = Packet::new(i + 1, PacketKind::Rtp, PACKET_SIZE, 0);
        pkt.app_data.probe_cluster_id = Some(cluster_id);
        rx_link.push(pkt, &mut rng).unwrap();
    }

    let mut rtcp_packets = Vec::new();
    for t in 0..300u64 {
        rx_link.tick(t).unwrap();
        ack_link.tick(t).unwrap();

        receiver.tick(t, &mut rx_link, &mut ack_link, &mut rng);

        while let Some(pkt) = ack_link.pull(t) {
            if pkt.kind == PacketKind::Rtcp {
                rtcp_packets.push(pkt);
            }
        }
    }

    let with_probe_info = rtcp_packets.iter().find_map(|pkt| match &pkt.extras {
        AlgorithmExtras::Rtp(extras) => extras.probe_info.as_ref(),
        _ => None,
    });

    let probe_info = with_probe_info.expect("an rtcp report should carry the probe cluster's summary");
    assert_eq!(probe_info.cluster_id, cluster_id);
    assert_eq!(probe_info.total_bytes, PACKET_COUNT as usize * PACKET_SIZE);
    assert!(
        probe_info.last_rcv_ts_ms - probe_info.first_rcv_ts_ms >= config.min_probe_duration_ms,
        "probe duration should satisfy the minimum before being reported"
    );

    let trace_bps = trace.bandwidth_at(0.0);
    let lower = trace_bps * 0.9;
    let upper = trace_bps * 1.1;
    assert!(
        probe_info.implied_rate_bps >= lower && probe_info.implied_rate_bps <= upper,
        "implied rate {} should be within 10% of the trace bandwidth {trace_bps}",
        probe_info.implied_rate_bps,
    );
}
