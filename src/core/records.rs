//! Append-only records produced while an experiment runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::experiment::Actor;
use crate::evaluation::ExperimentEvaluation;

/// Sticky (experiment, user) -> variant mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssignment {
    pub experiment_id: String,
    pub user_id: String,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// One metric observation. The variant is resolved when the event is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEvent {
    pub id: String,
    pub experiment_id: String,
    pub user_id: String,
    pub variant_id: String,
    pub metric_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Ticket,
    Rating,
    Review,
    Nps,
    Churn,
    InAppFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSignal {
    pub id: String,
    pub experiment_id: String,
    pub variant_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What a Decision Log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Start,
    Pause,
    Resume,
    RollForward,
    RollBack,
    Extend,
    InsufficientData,
    Graduate,
}

impl DecisionAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::RollForward => "roll_forward",
            Self::RollBack => "roll_back",
            Self::Extend => "extend",
            Self::InsufficientData => "insufficient_data",
            Self::Graduate => "graduate",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "start" => Self::Start,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "roll_forward" => Self::RollForward,
            "roll_back" => Self::RollBack,
            "extend" => Self::Extend,
            "insufficient_data" => Self::InsufficientData,
            "graduate" => Self::Graduate,
            _ => return None,
        })
    }
}

/// Immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    pub id: String,
    pub experiment_id: String,
    pub action: DecisionAction,
    pub reason: String,
    pub actor: Actor,
    #[serde(default)]
    pub evaluation: Option<ExperimentEvaluation>,
    pub timestamp: DateTime<Utc>,
}

impl DecisionLog {
    pub fn new(
        experiment_id: impl Into<String>,
        action: DecisionAction,
        reason: impl Into<String>,
        actor: Actor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            experiment_id: experiment_id.into(),
            action,
            reason: reason.into(),
            actor,
            evaluation: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn with_evaluation(mut self, evaluation: ExperimentEvaluation) -> Self {
        self.evaluation = Some(evaluation);
        self
    }
}
