use proptest::prelude::*;

use xpilot::stats::{calculate_lift, chi_squared_test, t_test};

fn arb_counts() -> impl Strategy<Value = (u64, u64)> {
    (1u64..5_000).prop_flat_map(|n| (0..=n, Just(n)))
}

proptest! {
    #[test]
    fn chi_squared_p_value_is_a_probability((c1, n1) in arb_counts(), (c2, n2) in arb_counts()) {
        let result = chi_squared_test(c1, n1, c2, n2);
        prop_assert!((0.0..=1.0).contains(&result.p_value), "p = {}", result.p_value);
        prop_assert!((result.confidence - (1.0 - result.p_value)).abs() < 1e-12);
    }

    #[test]
    fn chi_squared_is_symmetric((c1, n1) in arb_counts(), (c2, n2) in arb_counts()) {
        let forward = chi_squared_test(c1, n1, c2, n2);
        let backward = chi_squared_test(c2, n2, c1, n1);
        prop_assert!((forward.p_value - backward.p_value).abs() < 1e-9);
    }

    #[test]
    fn t_test_p_value_is_a_probability(
        a in prop::collection::vec(-1_000.0f64..1_000.0, 0..60),
        b in prop::collection::vec(-1_000.0f64..1_000.0, 0..60),
    ) {
        let result = t_test(&a, &b);
        prop_assert!((0.0..=1.0).contains(&result.p_value), "p = {}", result.p_value);
    }

    #[test]
    fn lift_sign_follows_the_change(control in 0.001f64..1_000.0, treatment in 0.0f64..1_000.0) {
        let lift = calculate_lift(control, treatment);
        prop_assert!(lift.is_finite());
        prop_assert_eq!(lift > 0.0, treatment > control);
        prop_assert!(lift >= -1.0);
    }
}
