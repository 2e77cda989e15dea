use proptest::prelude::*;

use xpilot::assignment::hashing::{BUCKET_COUNT, eligibility_bucket, variant_bucket};
use xpilot::assignment::select_variant;
use xpilot::core::Variant;
use xpilot::test_utils::fixtures::two_arm_experiment;

/// Weights summing to exactly 100, one to five arms.
fn arb_weights() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..=100, 1..5).prop_map(|raw| {
        let total: u32 = raw.iter().sum();
        let mut weights: Vec<u32> = raw.iter().map(|w| w * 100 / total).collect();
        let assigned: u32 = weights.iter().sum();
        weights[0] += 100 - assigned;
        weights
    })
}

proptest! {
    #[test]
    fn buckets_are_in_range_and_stable(exp in "[a-z0-9-]{1,24}", user in ".{0,40}") {
        let eligibility = eligibility_bucket(&exp, &user);
        let variant = variant_bucket(&exp, &user);
        prop_assert!(eligibility < BUCKET_COUNT);
        prop_assert!(variant < BUCKET_COUNT);
        prop_assert_eq!(eligibility, eligibility_bucket(&exp, &user));
        prop_assert_eq!(variant, variant_bucket(&exp, &user));
    }

    #[test]
    fn every_bucket_maps_to_a_weighted_variant(weights in arb_weights(), bucket in 0u32..BUCKET_COUNT) {
        let mut experiment = two_arm_experiment("exp-prop");
        experiment.variants = weights
            .iter()
            .enumerate()
            .map(|(i, weight)| {
                let variant = Variant::new(format!("v{i}"), format!("arm {i}"), *weight);
                if i == 0 { variant.control() } else { variant }
            })
            .collect();
        prop_assert!(experiment.validate().is_ok());

        let chosen = select_variant(&experiment, bucket).expect("variants exist");
        let index = experiment
            .variants
            .iter()
            .position(|variant| variant.id == chosen.id)
            .expect("chosen variant is declared");
        let lower: u32 = weights[..index].iter().map(|w| w * 100).sum();
        let upper = lower + weights[index] * 100;
        prop_assert!(bucket >= lower && bucket < upper, "bucket {} outside [{}, {})", bucket, lower, upper);
    }
}
