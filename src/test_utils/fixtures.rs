use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::app::AppContext;
use crate::clock::FixedClock;
use crate::config::Config;
use crate::core::{
    Aggregation, CohortConfig, Comparison, Experiment, ExperimentEvent, ExperimentMetric,
    ExperimentStatus, GuardrailAction, GuardrailMetric, MetricDirection, MetricType,
    SuccessCriterion, UserAssignment, Variant,
};
use crate::error::Result;
use crate::services::{AlertService, AlertSeverity, StoreFlagService};
use crate::storage::{ExperimentStore, MemoryStore};

/// Reference instant every fixture is anchored to.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

pub fn fixed_clock() -> FixedClock {
    FixedClock::new(fixed_now())
}

/// Running 50/50 checkout experiment on `app-1`, a week old.
///
/// Metrics: `conversion` (rate, should increase) and `error_rate` (avg,
/// should decrease). Guardrail: `error_rate > 0.05` rolls back. Success:
/// conversion lift of 5% at 95% confidence.
pub fn two_arm_experiment(id: &str) -> Experiment {
    Experiment {
        id: id.to_string(),
        name: format!("Checkout redesign ({id})"),
        hypothesis: "The new checkout converts better".to_string(),
        application_id: "app-1".to_string(),
        status: ExperimentStatus::Running,
        cohort: CohortConfig::everyone(),
        variants: vec![
            Variant::new("control", "control", 50)
                .control()
                .with_flag("new_checkout", serde_json::json!(false)),
            Variant::new("treatment", "treatment", 50)
                .with_flag("new_checkout", serde_json::json!(true)),
        ],
        metrics: vec![
            ExperimentMetric::new(
                "conversion",
                MetricType::Conversion,
                Aggregation::Rate,
                MetricDirection::Increase,
            ),
            ExperimentMetric::new(
                "error_rate",
                MetricType::Count,
                Aggregation::Avg,
                MetricDirection::Decrease,
            ),
        ],
        guardrails: vec![GuardrailMetric {
            metric_id: "error_rate".to_string(),
            threshold: 0.05,
            comparison: Comparison::Gt,
            description: "Error rate must stay under 5%".to_string(),
            action: GuardrailAction::Rollback,
        }],
        success_criteria: vec![SuccessCriterion {
            metric_id: "conversion".to_string(),
            min_lift: 0.05,
            confidence: 0.95,
        }],
        start_date: fixed_now() - Duration::days(7),
        end_date: None,
        min_sample_size: 100,
        min_duration_hours: 24.0,
        decision: None,
        decision_reason: None,
        decision_at: None,
        decision_by: None,
    }
}

pub fn event(
    experiment_id: &str,
    user_id: &str,
    variant_id: &str,
    metric_id: &str,
    value: f64,
) -> ExperimentEvent {
    ExperimentEvent {
        id: uuid::Uuid::new_v4().to_string(),
        experiment_id: experiment_id.to_string(),
        user_id: user_id.to_string(),
        variant_id: variant_id.to_string(),
        metric_id: metric_id.to_string(),
        value,
        timestamp: fixed_now(),
    }
}

/// Alert sink that keeps everything it is sent.
#[derive(Debug, Default)]
pub struct RecordingAlertService {
    sent: Mutex<Vec<(String, String, AlertSeverity)>>,
}

impl RecordingAlertService {
    pub fn sent(&self) -> Vec<(String, String, AlertSeverity)> {
        self.sent.lock().clone()
    }

    pub fn count(&self, severity: AlertSeverity) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(_, _, sent)| *sent == severity)
            .count()
    }
}

impl AlertService for RecordingAlertService {
    fn send_alert(&self, title: &str, message: &str, severity: AlertSeverity) -> Result<()> {
        self.sent
            .lock()
            .push((title.to_string(), message.to_string(), severity));
        Ok(())
    }
}

/// Fully wired engine over a [`MemoryStore`] and a [`FixedClock`].
pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub alerts: Arc<RecordingAlertService>,
    pub app: AppContext,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(fixed_clock());
        let alerts = Arc::new(RecordingAlertService::default());
        let app = AppContext::with_parts(
            config,
            store.clone(),
            Arc::new(StoreFlagService::new(store.clone())),
            alerts.clone(),
            clock.clone(),
        );
        Self {
            store,
            clock,
            alerts,
            app,
        }
    }

    /// Pin a user to a variant, bypassing bucketing.
    pub fn force_assignment(&self, experiment_id: &str, user_id: &str, variant_id: &str) {
        self.store
            .set_assignment(&UserAssignment {
                experiment_id: experiment_id.to_string(),
                user_id: user_id.to_string(),
                variant_id: variant_id.to_string(),
                assigned_at: fixed_now(),
            })
            .expect("memory store accepts assignments");
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
