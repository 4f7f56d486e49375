//! Oracle CC: cheats by reading the trace directly instead of inferring
//! capacity from feedback. `predict` mode samples the trace at the
//! *end* of the upcoming pacing interval; the non-predicting variant
//! samples at `now`, lagging a real controller's best case by one step.

use crate::trace::Trace;

pub struct Oracle {
    trace: Trace,
    predict: bool,
}

impl Oracle {
    pub fn new(trace: Trace, predict: bool) -> Self {
        Oracle { trace, predict }
    }

    pub fn get_est_rate_bps(&self, now_ms: u64, horizon_ms: u64) -> f64 {
        let t_ms = if self.predict { horizon_ms } else { now_ms };
        self.trace.bandwidth_at(t_ms as f64 / 1000.0) / 8.0
    }

    pub fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicting_oracle_samples_ahead() {
        let trace = Trace::new(vec![0.0, 1.0], vec![1.0, 2.0], 10, 0.0, 100, None, 2.0).unwrap();
        let o = Oracle::new(trace, true);
        // at now=900ms, horizon=1100ms -> predict samples past the 1.0s step
        let rate = o.get_est_rate_bps(900, 1100);
        assert!((rate - 2_000_000.0 / 8.0).abs() < 1.0);
    }

    #[test]
    fn non_predicting_oracle_samples_now() {
        let trace = Trace::new(vec![0.0, 1.0], vec![1.0, 2.0], 10, 0.0, 100, None, 2.0).unwrap();
        let o = Oracle::new(trace, false);
        let rate = o.get_est_rate_bps(900, 1100);
        assert!((rate - 1_000_000.0 / 8.0).abs() < 1.0);
    }
}
