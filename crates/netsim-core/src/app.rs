//! The application capability a sender/receiver host drives each tick.
//!
//! Concrete applications (file transfer, video streaming) live in the
//! `netsim-app` crate, which depends on this one; the trait is the seam
//! that lets `Host` stay ignorant of which application it carries.

use std::any::Any;

use crate::packet::Packet;

/// One completed video frame's timing/quality, as the decoder hands it
/// back up for the congestion controller's frame-aware signals (GCC's
/// delay-based controller, Aurora's app-aware reward).
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEvent {
    pub frame_id: u64,
    pub last_pkt_sent_ms: u64,
    pub last_pkt_rcv_ms: u64,
    pub recv_rate_bps: f64,
    pub frame_quality: f32,
    pub avg_delay_sec: f64,
}

pub trait Application: Any {
    fn tick(&mut self, now_ms: u64);

    /// Offer the next packet the application wants sent, if its size fits
    /// within `budget_bytes`. Must not mutate state on a refusal.
    fn next_pkt(&mut self, now_ms: u64, budget_bytes: usize) -> Option<Packet>;

    fn on_pkt_rcvd(&mut self, pkt: &Packet, now_ms: u64);

    fn reset(&mut self);

    /// Called once per host tick, before `tick`, with the sender's current
    /// pacing rate and the bytes already spoken for by retransmission and
    /// in-application queues. Only the video encoder uses this (§4.11's
    /// rate allocator); other applications ignore it.
    fn on_budget_update(
        &mut self,
        _pacing_rate_bps: f64,
        _pending_rtx_bytes: usize,
        _update_step_ms: u64,
    ) {
    }

    /// Drain frame-completion events accumulated since the last call.
    /// Only the video decoder produces these; other applications keep
    /// the default empty drain.
    fn take_frame_events(&mut self) -> Vec<FrameEvent> {
        Vec::new()
    }

    /// Recover the concrete application type so a runner can pull
    /// implementation-specific telemetry (e.g. the decoder's per-frame
    /// records) out of a `Box<dyn Application>`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
