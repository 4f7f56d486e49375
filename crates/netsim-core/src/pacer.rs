//! # Pacer — leaky-bucket send admission
//!
//! The only channel through which a congestion controller influences a
//! host: it sets `pacing_rate_Bps`, and everything else (cwnd aside, for
//! BBR) flows from how fast the permit pool refills.

use tracing::trace;

/// One pacing-rate update, for `pacer_log.csv`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PacerLogRecord {
    pub now_ms: u64,
    pub prev_rate_bps: f64,
    pub new_rate_bps: f64,
    pub permit_bytes: f64,
}

/// Leaky-bucket permit pool gating how many bytes a host may send right now.
pub struct Pacer {
    capacity_bytes: f64,
    permit_bytes: f64,
    pacing_rate_bps: f64,
    update_step_ms: u64,
    last_refill_ms: u64,
    last_rate_query_ms: u64,
    pending_log: Vec<PacerLogRecord>,
}

impl Pacer {
    pub fn new(capacity_bytes: usize, update_step_ms: u64) -> Self {
        Pacer {
            capacity_bytes: capacity_bytes as f64,
            permit_bytes: capacity_bytes as f64,
            pacing_rate_bps: 0.0,
            update_step_ms,
            last_refill_ms: 0,
            last_rate_query_ms: 0,
            pending_log: Vec::new(),
        }
    }

    pub fn pacing_rate_bps(&self) -> f64 {
        self.pacing_rate_bps
    }

    /// Drains rate-update telemetry since the last call, for `pacer_log.csv`.
    pub fn take_log_records(&mut self) -> Vec<PacerLogRecord> {
        std::mem::take(&mut self.pending_log)
    }

    pub fn update_step_ms(&self) -> u64 {
        self.update_step_ms
    }

    pub fn can_send(&self, n_bytes: usize) -> bool {
        self.permit_bytes >= n_bytes as f64
    }

    pub fn available_bytes(&self) -> usize {
        self.permit_bytes.floor().max(0.0) as usize
    }

    pub fn on_pkt_sent(&mut self, n_bytes: usize) {
        self.permit_bytes = (self.permit_bytes - n_bytes as f64).max(0.0);
    }

    /// Refill the permit pool and, every `update_step_ms`, re-query `rate_fn`
    /// for a fresh pacing rate. `rate_fn` is the CC's `get_est_rate_Bps`.
    pub fn tick(&mut self, now_ms: u64, rate_fn: impl FnOnce(u64, u64) -> f64) {
        let elapsed_ms = now_ms.saturating_sub(self.last_refill_ms);
        if elapsed_ms > 0 {
            self.permit_bytes =
                (self.permit_bytes + self.pacing_rate_bps * elapsed_ms as f64 / 1000.0)
                    .min(self.capacity_bytes);
            self.last_refill_ms = now_ms;
        }

        if now_ms.saturating_sub(self.last_rate_query_ms) >= self.update_step_ms
            || now_ms == 0
        {
            let new_rate = rate_fn(now_ms, now_ms + self.update_step_ms);
            if (new_rate - self.pacing_rate_bps).abs() > f64::EPSILON {
                trace!(
                    from = self.pacing_rate_bps,
                    to = new_rate,
                    now_ms,
                    "pacer rate update"
                );
            }
            self.pending_log.push(PacerLogRecord {
                now_ms,
                prev_rate_bps: self.pacing_rate_bps,
                new_rate_bps: new_rate.max(0.0),
                permit_bytes: self.permit_bytes,
            });
            self.pacing_rate_bps = new_rate.max(0.0);
            self.last_rate_query_ms = now_ms;
        }
    }

    pub fn reset(&mut self) {
        self.permit_bytes = self.capacity_bytes;
        self.pacing_rate_bps = 0.0;
        self.last_refill_ms = 0;
        self.last_rate_query_ms = 0;
        self.pending_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permit_pool_caps_at_capacity() {
        let mut p = Pacer::new(3000, 40);
        p.tick(0, |_, _| 10_000_000.0);
        p.tick(1000, |_, _| 10_000_000.0);
        assert!(p.permit_bytes <= 3000.0);
    }

    #[test]
    fn zero_rate_blocks_sending() {
        let mut p = Pacer::new(3000, 40);
        p.tick(0, |_, _| 0.0);
        p.on_pkt_sent(3000);
        p.tick(1000, |_, _| 0.0);
        assert!(!p.can_send(1));
    }

    #[test]
    fn rate_query_only_every_update_step() {
        let mut calls = 0;
        let mut p = Pacer::new(3000, 40);
        for t in 0..100u64 {
            p.tick(t, |_, _| {
                calls += 1;
                500.0
            });
        }
        // queried at t=0 and every 40ms thereafter: 0,40,80 => 3 calls
        assert_eq!(calls, 3);
    }

    #[test]
    fn can_send_reflects_permit() {
        let mut p = Pacer::new(3000, 40);
        p.tick(0, |_, _| 1_000_000.0);
        assert!(p.can_send(1000));
        p.on_pkt_sent(3000);
        assert!(!p.can_send(1));
    }
}
