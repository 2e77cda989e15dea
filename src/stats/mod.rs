//! Closed-form significance tests used by experiment evaluation.
//!
//! These are the engine's own approximations (rational normal CDF, a
//! t-to-z mapping instead of the Student-t CDF). Results are expected to be
//! reproducible bit-for-bit across releases, so the formulas stay as they are.

use serde::{Deserialize, Serialize};

/// Default two-tailed significance threshold.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Default statistical power for sample-size planning.
pub const DEFAULT_POWER: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
    pub confidence: f64,
    pub is_significant: bool,
}

impl TestResult {
    /// Result for inputs that carry no information (empty groups, zero variance).
    pub const fn inconclusive() -> Self {
        Self {
            statistic: 0.0,
            p_value: 1.0,
            confidence: 0.0,
            is_significant: false,
        }
    }

    fn from_p_value(statistic: f64, p_value: f64) -> Self {
        let p_value = p_value.clamp(0.0, 1.0);
        Self {
            statistic,
            p_value,
            confidence: calculate_confidence(p_value),
            is_significant: is_significant(p_value, DEFAULT_SIGNIFICANCE_LEVEL),
        }
    }
}

/// Standard normal CDF via the Abramowitz-Stegun 7.1.26 erf approximation
/// (max absolute error about 1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + P * z);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    let erf = 1.0 - poly * (-z * z).exp();
    0.5 * (1.0 + sign * erf)
}

/// Inverse standard normal CDF via the Abramowitz-Stegun 26.2.23 rational
/// approximation. `p` must lie strictly inside (0, 1); the tails return
/// infinities.
pub fn z_score(p: f64) -> f64 {
    const C0: f64 = 2.515_517;
    const C1: f64 = 0.802_853;
    const C2: f64 = 0.010_328;
    const D1: f64 = 1.432_788;
    const D2: f64 = 0.189_269;
    const D3: f64 = 0.001_308;

    if p.is_nan() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let (q, sign) = if p < 0.5 { (p, -1.0) } else { (1.0 - p, 1.0) };
    let t = (-2.0 * q.ln()).sqrt();
    let z = t - (C0 + C1 * t + C2 * t * t) / (1.0 + D1 * t + D2 * t * t + D3 * t * t * t);
    sign * z
}

fn two_tailed_p(z: f64) -> f64 {
    2.0 * (1.0 - normal_cdf(z.abs()))
}

/// Pearson chi-squared test (1 degree of freedom) on the 2x2 table of
/// conversions vs non-conversions for control (`c1` of `n1`) and treatment
/// (`c2` of `n2`).
pub fn chi_squared_test(c1: u64, n1: u64, c2: u64, n2: u64) -> TestResult {
    let c1 = c1.min(n1) as f64;
    let c2 = c2.min(n2) as f64;
    let n1 = n1 as f64;
    let n2 = n2 as f64;

    let total = n1 + n2;
    let converted = c1 + c2;
    let not_converted = total - converted;
    if total == 0.0 || n1 == 0.0 || n2 == 0.0 || converted == 0.0 || not_converted == 0.0 {
        return TestResult::inconclusive();
    }

    let observed = [[c1, n1 - c1], [c2, n2 - c2]];
    let rows = [n1, n2];
    let cols = [converted, not_converted];

    let mut statistic = 0.0;
    for (row, row_total) in observed.iter().zip(rows) {
        for (cell, col_total) in row.iter().zip(cols) {
            let expected = row_total * col_total / total;
            statistic += (cell - expected).powi(2) / expected;
        }
    }

    TestResult::from_p_value(statistic, two_tailed_p(statistic.sqrt()))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

/// Welch's unequal-variance t-test. `sample_a` is the baseline; a positive
/// statistic means `sample_b` has the larger mean.
///
/// The two-tailed p-value maps `t` onto an equivalent z-score with
/// `z = t(1 - 1/(4df)) / sqrt(1 + t^2/(2df))` and uses the normal CDF.
pub fn t_test(sample_a: &[f64], sample_b: &[f64]) -> TestResult {
    if sample_a.len() < 2 || sample_b.len() < 2 {
        return TestResult::inconclusive();
    }

    let n_a = sample_a.len() as f64;
    let n_b = sample_b.len() as f64;
    let mean_a = mean(sample_a);
    let mean_b = mean(sample_b);
    let se_a = sample_variance(sample_a, mean_a) / n_a;
    let se_b = sample_variance(sample_b, mean_b) / n_b;
    let standard_error = (se_a + se_b).sqrt();
    if standard_error == 0.0 || !standard_error.is_finite() {
        return TestResult::inconclusive();
    }

    let t = (mean_b - mean_a) / standard_error;
    let df = (se_a + se_b).powi(2) / (se_a.powi(2) / (n_a - 1.0) + se_b.powi(2) / (n_b - 1.0));
    let z = t * (1.0 - 1.0 / (4.0 * df)) / (1.0 + t * t / (2.0 * df)).sqrt();

    TestResult::from_p_value(t, two_tailed_p(z))
}

/// Relative change of `treatment` over `control`.
pub fn calculate_lift(control: f64, treatment: f64) -> f64 {
    if control == 0.0 {
        return if treatment == 0.0 { 0.0 } else { f64::INFINITY };
    }
    (treatment - control) / control
}

/// Informal confidence, `1 - p`. Not a calibrated interval.
pub fn calculate_confidence(p_value: f64) -> f64 {
    1.0 - p_value
}

pub fn is_significant(p_value: f64, threshold: f64) -> bool {
    p_value < threshold
}

/// Per-variant sample size for a two-proportion z-test at alpha = 0.05
/// (two-tailed). `min_detectable_effect` is relative to `base_rate`.
pub fn calculate_sample_size(base_rate: f64, min_detectable_effect: f64, power: f64) -> f64 {
    let p1 = base_rate;
    let p2 = base_rate * (1.0 + min_detectable_effect);
    let effect = (p2 - p1).powi(2);
    if effect == 0.0 {
        return f64::INFINITY;
    }

    let z_alpha = z_score(1.0 - DEFAULT_SIGNIFICANCE_LEVEL / 2.0);
    let z_beta = z_score(power);
    let pooled = (p1 + p2) / 2.0;

    let numerator = (z_alpha * (2.0 * pooled * (1.0 - pooled)).sqrt()
        + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt())
    .powi(2);
    (numerator / effect).ceil()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < EPS);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-4);
        assert!(normal_cdf(8.0) <= 1.0);
        assert!(normal_cdf(-8.0) >= 0.0);
    }

    #[test]
    fn z_score_inverts_cdf() {
        assert!((z_score(0.975) - 1.96).abs() < 1e-3);
        assert!((z_score(0.8) - 0.8416).abs() < 1e-3);
        assert!((z_score(0.5)).abs() < 1e-3);
        assert!((z_score(0.025) + 1.96).abs() < 1e-3);
    }

    #[test]
    fn chi_squared_detects_real_difference() {
        let result = chi_squared_test(100, 1000, 150, 1000);
        assert!(result.is_significant);
        assert!(result.p_value < 0.05);
        assert!((result.statistic - 11.428_571).abs() < 1e-3);
        assert!((result.confidence - (1.0 - result.p_value)).abs() < EPS);
    }

    #[test]
    fn chi_squared_identical_groups() {
        let result = chi_squared_test(50, 500, 50, 500);
        assert!(result.statistic.abs() < EPS);
        assert!(!result.is_significant);
    }

    #[test]
    fn chi_squared_degenerate_inputs() {
        assert_eq!(chi_squared_test(0, 0, 0, 0), TestResult::inconclusive());
        assert_eq!(chi_squared_test(0, 100, 0, 100), TestResult::inconclusive());
        assert_eq!(chi_squared_test(10, 10, 5, 5), TestResult::inconclusive());
        assert_eq!(chi_squared_test(3, 10, 0, 0).p_value, 1.0);
    }

    #[test]
    fn t_test_requires_two_samples_per_group() {
        let result = t_test(&[1.0], &[1.0, 2.0, 3.0]);
        assert_eq!(result.p_value, 1.0);
        assert!(!result.is_significant);
    }

    #[test]
    fn t_test_separated_groups_significant() {
        let control: Vec<f64> = (0..50).map(|i| 10.0 + f64::from(i % 5) * 0.1).collect();
        let treatment: Vec<f64> = (0..50).map(|i| 12.0 + f64::from(i % 5) * 0.1).collect();
        let result = t_test(&control, &treatment);
        assert!(result.statistic > 0.0);
        assert!(result.is_significant);
    }

    #[test]
    fn t_test_overlapping_groups_not_significant() {
        let control = [1.0, 2.0, 3.0, 4.0, 5.0];
        let treatment = [1.5, 2.5, 2.0, 4.5, 4.0];
        let result = t_test(&control, &treatment);
        assert!(!result.is_significant);
        assert!(result.p_value > 0.05 && result.p_value <= 1.0);
    }

    #[test]
    fn t_test_zero_variance_is_inconclusive() {
        assert_eq!(t_test(&[2.0, 2.0], &[2.0, 2.0]), TestResult::inconclusive());
    }

    #[test]
    fn lift_edge_cases() {
        assert!((calculate_lift(100.0, 110.0) - 0.1).abs() < EPS);
        assert!(calculate_lift(0.0, 10.0).is_infinite());
        assert_eq!(calculate_lift(0.0, 0.0), 0.0);
        assert!((calculate_lift(10.0, 5.0) + 0.5).abs() < EPS);
    }

    #[test]
    fn significance_threshold_is_strict() {
        assert!(is_significant(0.049, 0.05));
        assert!(!is_significant(0.05, 0.05));
        assert!((calculate_confidence(0.03) - 0.97).abs() < EPS);
    }

    #[test]
    fn sample_size_grows_as_effect_shrinks() {
        let small = calculate_sample_size(0.1, 0.05, 0.8);
        let large = calculate_sample_size(0.1, 0.2, 0.8);
        assert!(small > large);
        assert!(large > 0.0 && large.is_finite());
        assert!(calculate_sample_size(0.1, 0.0, 0.8).is_infinite());
    }

    #[test]
    fn approximations_are_pinned() {
        assert!((normal_cdf(1.0) - 0.841_344_736).abs() < 1e-8);
        assert!((z_score(0.975) - 1.960_394_917).abs() < 1e-8);
        assert!((z_score(0.8) - 0.841_456_717).abs() < 1e-8);
    }

    #[test]
    fn chi_squared_p_value_is_pinned() {
        let result = chi_squared_test(100, 1000, 150, 1000);
        assert!((result.p_value - 0.000_723_339).abs() < 1e-8);
    }

    #[test]
    fn welch_p_value_uses_t_to_z_mapping() {
        // t = 2, df = 8, mapped z = 1.732953. A Student-t CDF would give p = 0.0805.
        let result = t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!((result.statistic - 2.0).abs() < 1e-12);
        assert!((result.p_value - 0.083_104_004).abs() < 1e-8);
        assert!(!result.is_significant);

        let uneven = t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!((uneven.statistic - 1.851_640_200).abs() < 1e-8);
        assert!((uneven.p_value - 0.095_421_446).abs() < 1e-8);
    }

    #[test]
    fn sample_size_values_are_pinned() {
        assert_eq!(calculate_sample_size(0.1, 0.2, 0.8), 3842.0);
        assert_eq!(calculate_sample_size(0.1, 0.05, 0.8), 57774.0);
        assert_eq!(calculate_sample_size(0.1, 0.1, 0.9), 19755.0);
    }

    #[test]
    fn sample_size_grows_with_power() {
        assert!(calculate_sample_size(0.1, 0.1, 0.9) > calculate_sample_size(0.1, 0.1, 0.8));
    }
}
