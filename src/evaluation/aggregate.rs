//! Per-variant metric aggregation.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::core::{Aggregation, ExperimentEvent};

/// Events of one variant, indexed for aggregation.
#[derive(Debug, Default)]
pub struct VariantEvents<'a> {
    /// Distinct users with at least one event of any metric.
    pub users: BTreeSet<&'a str>,
    pub by_metric: BTreeMap<&'a str, Vec<&'a ExperimentEvent>>,
}

impl<'a> VariantEvents<'a> {
    pub fn metric(&self, metric_id: &str) -> &[&'a ExperimentEvent] {
        self.by_metric.get(metric_id).map_or(&[], Vec::as_slice)
    }

    pub fn values(&self, metric_id: &str) -> Vec<f64> {
        self.metric(metric_id).iter().map(|event| event.value).collect()
    }

    /// Distinct users that reported `metric_id`.
    pub fn metric_users(&self, metric_id: &str) -> u64 {
        self.metric(metric_id)
            .iter()
            .map(|event| event.user_id.as_str())
            .unique()
            .count() as u64
    }

    /// Distinct users with at least one positive value for `metric_id`.
    pub fn converted_users(&self, metric_id: &str) -> u64 {
        self.metric(metric_id)
            .iter()
            .filter(|event| event.value > 0.0)
            .map(|event| event.user_id.as_str())
            .unique()
            .count() as u64
    }

    pub fn user_count(&self) -> u64 {
        self.users.len() as u64
    }

    pub fn aggregate(&self, metric_id: &str, aggregation: Aggregation) -> f64 {
        let values = self.values(metric_id);
        match aggregation {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => mean(&values),
            Aggregation::Count => values.len() as f64,
            Aggregation::Rate => {
                let users = self.user_count();
                if users == 0 {
                    0.0
                } else {
                    self.converted_users(metric_id) as f64 / users as f64
                }
            }
            Aggregation::P50 => percentile(&values, 50.0),
            Aggregation::P95 => percentile(&values, 95.0),
        }
    }
}

/// Split an experiment's events by variant id.
pub fn group_by_variant(events: &[ExperimentEvent]) -> BTreeMap<&str, VariantEvents<'_>> {
    let mut grouped: BTreeMap<&str, VariantEvents<'_>> = BTreeMap::new();
    for event in events {
        let entry = grouped.entry(event.variant_id.as_str()).or_default();
        entry.users.insert(event.user_id.as_str());
        entry
            .by_metric
            .entry(event.metric_id.as_str())
            .or_default()
            .push(event);
    }
    grouped
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile; 0 for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted: Vec<f64> = values.iter().copied().sorted_by(f64::total_cmp).collect();
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::event;

    #[test]
    fn percentile_uses_nearest_rank() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&values, 50.0), 10.0);
        assert_eq!(percentile(&values, 95.0), 19.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[3.0, 1.0, 2.0], 50.0), 2.0);
    }

    #[test]
    fn aggregations_over_one_variant() {
        let events = vec![
            event("e", "u1", "treatment", "latency", 100.0),
            event("e", "u1", "treatment", "latency", 300.0),
            event("e", "u2", "treatment", "latency", 200.0),
            event("e", "u2", "treatment", "conversion", 1.0),
            event("e", "u3", "treatment", "conversion", 0.0),
            event("e", "u4", "treatment", "page_view", 1.0),
        ];
        let grouped = group_by_variant(&events);
        let treatment = &grouped["treatment"];

        assert_eq!(treatment.user_count(), 4);
        assert_eq!(treatment.aggregate("latency", Aggregation::Sum), 600.0);
        assert_eq!(treatment.aggregate("latency", Aggregation::Avg), 200.0);
        assert_eq!(treatment.aggregate("latency", Aggregation::Count), 3.0);
        assert_eq!(treatment.aggregate("latency", Aggregation::P50), 200.0);
        assert_eq!(treatment.metric_users("latency"), 2);
        // 1 converted user out of 4 users with any event
        assert_eq!(treatment.aggregate("conversion", Aggregation::Rate), 0.25);
    }

    #[test]
    fn missing_metric_aggregates_to_zero() {
        let grouped = group_by_variant(&[]);
        assert!(grouped.is_empty());
        let empty = VariantEvents::default();
        for aggregation in [
            Aggregation::Sum,
            Aggregation::Avg,
            Aggregation::Count,
            Aggregation::Rate,
            Aggregation::P50,
            Aggregation::P95,
        ] {
            assert_eq!(empty.aggregate("anything", aggregation), 0.0);
        }
    }
}
