//! Property tests over the lookup table's loss-quantisation function,
//! the one piece of this crate that's a pure mapping over an unbounded
//! input range rather than a stateful component with its own fixtures.

use netsim_app::lookup::quantise_loss;
use proptest::prelude::*;

proptest! {
    #[test]
    fn quantised_loss_always_lands_in_the_tenths_range(loss in -10.0f64..10.0) {
        let tenths = quantise_loss(loss);
        prop_assert!(tenths <= 10);
    }

    #[test]
    fn quantised_loss_is_monotonic_non_decreasing(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(quantise_loss(lo) <= quantise_loss(hi));
    }

    #[test]
    fn quantised_loss_is_idempotent_on_its_own_tenths(tenth in 0u8..=10) {
        let loss = tenth as f64 / 10.0;
        prop_assert_eq!(quantise_loss(loss), tenth);
    }

    #[test]
    fn quantised_loss_clamps_out_of_range_inputs(loss in -10.0f64..10.0) {
        let tenths = quantise_loss(loss);
        if loss <= 0.0 {
            prop_assert_eq!(tenths, 0);
        } else if loss >= 1.0 {
            prop_assert_eq!(tenths, 10);
        }
    }
}
