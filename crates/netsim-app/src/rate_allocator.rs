//! Splits the pacer's budget for the next `pacing_rate_update_step_ms`
//! between pending retransmissions and fresh encode bytes, so a hungry
//! encoder can never starve the rtx queue.

/// Stateless; one instance per sender, holding only the video's frame rate.
pub struct RateAllocator {
    fps: f64,
}

impl RateAllocator {
    pub fn new(fps: f64) -> Self {
        RateAllocator { fps }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// `pacing_rate_bps` is bytes/sec despite the name (matches `Pacer`).
    /// Returns a target bitrate in bytes/sec for the encoder's next frame.
    pub fn target_encode_bitrate_bps(
        &self,
        pacing_rate_bps: f64,
        update_step_ms: u64,
        pending_rtx_bytes: usize,
        app_queue_bytes: usize,
    ) -> f64 {
        let pace_bytes = pacing_rate_bps * update_step_ms as f64 / 1000.0;
        let encode_bytes =
            (pace_bytes - pending_rtx_bytes as f64 - app_queue_bytes as f64).max(0.0);
        encode_bytes * self.fps
    }
}
