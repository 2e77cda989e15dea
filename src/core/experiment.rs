//! Experiment definition types and lifecycle status.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XpError};

/// Opaque feature-flag payload. Values are forwarded, never interpreted.
pub type FlagMap = BTreeMap<String, serde_json::Value>;

/// Name a variant must carry to act as the baseline when not flagged explicitly.
pub const CONTROL_VARIANT_NAME: &str = "control";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Paused,
    Completed,
    RolledBack,
}

impl ExperimentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Completed and rolled back experiments never change status again.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack)
    }

    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Running)
                | (Self::Running, Self::Paused | Self::Completed | Self::RolledBack)
                | (Self::Paused, Self::Running | Self::Completed | Self::RolledBack)
        )
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "draft" => Ok(Self::Draft),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(XpError::ValidationFailed(format!(
                "unknown experiment status: {other}"
            ))),
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    /// Share of eligible traffic, 0..=100.
    pub weight: u32,
    #[serde(default)]
    pub is_control: bool,
    #[serde(default)]
    pub feature_flags: FlagMap,
}

impl Variant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            weight,
            is_control: false,
            feature_flags: FlagMap::new(),
        }
    }

    #[must_use]
    pub fn control(mut self) -> Self {
        self.is_control = true;
        self
    }

    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.feature_flags.insert(key.into(), value);
        self
    }

    pub fn is_control(&self) -> bool {
        self.is_control || self.name == CONTROL_VARIANT_NAME || self.id == CONTROL_VARIANT_NAME
    }
}

/// Eligibility rule. Decides who may enter the experiment, not which arm they get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CohortConfig {
    Percentage {
        percentage: f64,
        #[serde(default)]
        exclude_list: Vec<String>,
    },
    Segment {
        segments: Vec<String>,
    },
    Allowlist {
        user_ids: Vec<String>,
    },
}

impl CohortConfig {
    pub const fn everyone() -> Self {
        Self::Percentage {
            percentage: 100.0,
            exclude_list: Vec::new(),
        }
    }

    pub fn exclude_list(&self) -> &[String] {
        match self {
            Self::Percentage { exclude_list, .. } => exclude_list,
            Self::Segment { .. } | Self::Allowlist { .. } => &[],
        }
    }

    pub fn is_excluded(&self, user_id: &str) -> bool {
        self.exclude_list().iter().any(|id| id == user_id)
    }
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self::everyone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Conversion,
    Count,
    Duration,
    Revenue,
    Satisfaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Avg,
    P50,
    P95,
    Count,
    Rate,
}

/// Which direction of change counts as an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetric {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub aggregation: Aggregation,
    pub direction: MetricDirection,
}

impl ExperimentMetric {
    pub fn new(
        id: impl Into<String>,
        metric_type: MetricType,
        aggregation: Aggregation,
        direction: MetricDirection,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            metric_type,
            aggregation,
            direction,
        }
    }

    /// Conversion-style metrics are compared with a chi-squared test on
    /// per-user conversions instead of a t-test on raw values.
    pub fn is_conversion(&self) -> bool {
        self.metric_type == MetricType::Conversion || self.aggregation == Aggregation::Rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Comparison {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Gte => value >= threshold,
            Self::Lte => value <= threshold,
        }
    }

    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailAction {
    #[default]
    Rollback,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailMetric {
    pub metric_id: String,
    pub threshold: f64,
    pub comparison: Comparison,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: GuardrailAction,
}

impl GuardrailMetric {
    /// A guardrail is breached when the observed value satisfies its comparison.
    pub fn is_breached_by(&self, value: f64) -> bool {
        self.comparison.holds(value, self.threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriterion {
    pub metric_id: String,
    /// Required relative lift, as a fraction.
    pub min_lift: f64,
    /// Required confidence, e.g. 0.95.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    RollForward,
    RollBack,
    Extend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Auto,
    Manual,
}

impl Actor {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hypothesis: String,
    pub application_id: String,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub cohort: CohortConfig,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub metrics: Vec<ExperimentMetric>,
    #[serde(default)]
    pub guardrails: Vec<GuardrailMetric>,
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_sample_size: u64,
    /// Minimum run time in hours before any verdict.
    #[serde(default)]
    pub min_duration_hours: f64,
    #[serde(default)]
    pub decision: Option<DecisionType>,
    #[serde(default)]
    pub decision_reason: Option<String>,
    #[serde(default)]
    pub decision_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decision_by: Option<Actor>,
}

impl Experiment {
    pub fn control_variant(&self) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.is_control())
    }

    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.id == variant_id)
    }

    pub fn treatment_variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|variant| !variant.is_control())
    }

    pub fn metric(&self, metric_id: &str) -> Option<&ExperimentMetric> {
        self.metrics.iter().find(|metric| metric.id == metric_id)
    }

    /// Control variant, or a validation error for malformed definitions.
    pub fn require_control(&self) -> Result<&Variant> {
        self.control_variant().ok_or_else(|| {
            XpError::ValidationFailed(format!("experiment {} has no control variant", self.id))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(XpError::ValidationFailed("experiment id cannot be empty".to_string()));
        }
        if self.variants.is_empty() {
            return Err(XpError::ValidationFailed(format!(
                "experiment {} has no variants",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.id.as_str()) {
                return Err(XpError::ValidationFailed(format!(
                    "duplicate variant id: {}",
                    variant.id
                )));
            }
            if variant.weight > 100 {
                return Err(XpError::ValidationFailed(format!(
                    "variant {} weight {} exceeds 100",
                    variant.id, variant.weight
                )));
            }
        }

        let total: u32 = self.variants.iter().map(|variant| variant.weight).sum();
        if total != 100 {
            return Err(XpError::ValidationFailed(format!(
                "variant weights must sum to 100, got {total}"
            )));
        }

        let controls = self.variants.iter().filter(|variant| variant.is_control()).count();
        if controls != 1 {
            return Err(XpError::ValidationFailed(format!(
                "experiment must have exactly one control variant, found {controls}"
            )));
        }

        if let CohortConfig::Percentage { percentage, .. } = &self.cohort {
            if !(0.0..=100.0).contains(percentage) {
                return Err(XpError::InvalidPercentage(*percentage));
            }
        }

        Ok(())
    }
}
