//! No congestion control: a fixed pacing rate, never adjusted. Useful as
//! a baseline and for isolating link/application behaviour in tests.

pub struct NoCc {
    rate_bps: f64,
}

impl NoCc {
    pub fn new(rate_bps: f64) -> Self {
        NoCc { rate_bps }
    }

    pub fn get_est_rate_bps(&self, _now_ms: u64, _horizon_ms: u64) -> f64 {
        self.rate_bps
    }

    pub fn reset(&mut self) {}
}
