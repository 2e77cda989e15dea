//! Core experiment types

pub mod experiment;
pub mod presets;
pub mod records;

pub use experiment::{
    Actor, Aggregation, CohortConfig, Comparison, DecisionType, Experiment, ExperimentMetric,
    ExperimentStatus, FlagMap, GuardrailAction, GuardrailMetric, MetricDirection, MetricType,
    SuccessCriterion, Variant,
};
pub use presets::{EXPERIMENT_PRESETS, ExperimentPreset, preset};
pub use records::{
    DecisionAction, DecisionLog, ExperimentEvent, FeedbackSignal, FeedbackType, Sentiment,
    UserAssignment,
};
