//! In-process store backed by `parking_lot` guarded maps.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{ExperimentFilter, ExperimentStore, ExperimentUpdate};
use crate::core::{
    DecisionLog, Experiment, ExperimentEvent, FeedbackSignal, FlagMap, UserAssignment,
};
use crate::error::{Result, XpError};

#[derive(Debug, Default)]
struct State {
    experiments: BTreeMap<String, Experiment>,
    assignments: HashMap<(String, String), UserAssignment>,
    events: Vec<ExperimentEvent>,
    feedback: Vec<FeedbackSignal>,
    decision_logs: Vec<DecisionLog>,
    segments: HashMap<String, Vec<String>>,
    flags: HashMap<String, FlagMap>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExperimentStore for MemoryStore {
    fn create_experiment(&self, experiment: &Experiment) -> Result<()> {
        let mut state = self.state.write();
        if state.experiments.contains_key(&experiment.id) {
            return Err(XpError::ValidationFailed(format!(
                "experiment already exists: {}",
                experiment.id
            )));
        }
        state
            .experiments
            .insert(experiment.id.clone(), experiment.clone());
        Ok(())
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<Option<Experiment>> {
        Ok(self.state.read().experiments.get(experiment_id).cloned())
    }

    fn update_experiment(
        &self,
        experiment_id: &str,
        update: &ExperimentUpdate,
    ) -> Result<Experiment> {
        let mut state = self.state.write();
        let experiment = state
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| XpError::ExperimentNotFound(experiment_id.to_string()))?;
        update.apply(experiment);
        Ok(experiment.clone())
    }

    fn list_experiments(&self, filter: &ExperimentFilter) -> Result<Vec<Experiment>> {
        Ok(self
            .state
            .read()
            .experiments
            .values()
            .filter(|experiment| filter.matches(experiment))
            .cloned()
            .collect())
    }

    fn get_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
    ) -> Result<Option<UserAssignment>> {
        Ok(self
            .state
            .read()
            .assignments
            .get(&(experiment_id.to_string(), user_id.to_string()))
            .cloned())
    }

    fn set_assignment(&self, assignment: &UserAssignment) -> Result<()> {
        self.state.write().assignments.insert(
            (assignment.experiment_id.clone(), assignment.user_id.clone()),
            assignment.clone(),
        );
        Ok(())
    }

    fn get_assignments_by_user(&self, user_id: &str) -> Result<Vec<UserAssignment>> {
        let mut assignments: Vec<UserAssignment> = self
            .state
            .read()
            .assignments
            .values()
            .filter(|assignment| assignment.user_id == user_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        Ok(assignments)
    }

    fn clear_assignments(&self, experiment_id: &str) -> Result<usize> {
        let mut state = self.state.write();
        let before = state.assignments.len();
        state
            .assignments
            .retain(|(experiment, _), _| experiment != experiment_id);
        Ok(before - state.assignments.len())
    }

    fn add_event(&self, event: &ExperimentEvent) -> Result<()> {
        self.state.write().events.push(event.clone());
        Ok(())
    }

    fn add_events(&self, events: &[ExperimentEvent]) -> Result<()> {
        self.state.write().events.extend_from_slice(events);
        Ok(())
    }

    fn get_events(
        &self,
        experiment_id: &str,
        metric_id: Option<&str>,
    ) -> Result<Vec<ExperimentEvent>> {
        Ok(self
            .state
            .read()
            .events
            .iter()
            .filter(|event| event.experiment_id == experiment_id)
            .filter(|event| metric_id.is_none_or(|metric| event.metric_id == metric))
            .cloned()
            .collect())
    }

    fn get_events_by_variant(
        &self,
        experiment_id: &str,
        variant_id: &str,
    ) -> Result<Vec<ExperimentEvent>> {
        Ok(self
            .state
            .read()
            .events
            .iter()
            .filter(|event| event.experiment_id == experiment_id && event.variant_id == variant_id)
            .cloned()
            .collect())
    }

    fn add_feedback(&self, signal: &FeedbackSignal) -> Result<()> {
        self.state.write().feedback.push(signal.clone());
        Ok(())
    }

    fn get_feedback(
        &self,
        experiment_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackSignal>> {
        let mut signals: Vec<FeedbackSignal> = self
            .state
            .read()
            .feedback
            .iter()
            .filter(|signal| signal.experiment_id == experiment_id)
            .filter(|signal| since.is_none_or(|since| signal.timestamp >= since))
            .cloned()
            .collect();
        signals.sort_by_key(|signal| signal.timestamp);
        Ok(signals)
    }

    fn add_decision_log(&self, entry: &DecisionLog) -> Result<()> {
        self.state.write().decision_logs.push(entry.clone());
        Ok(())
    }

    fn get_decision_logs(&self, experiment_id: &str) -> Result<Vec<DecisionLog>> {
        Ok(self
            .state
            .read()
            .decision_logs
            .iter()
            .filter(|entry| entry.experiment_id == experiment_id)
            .cloned()
            .collect())
    }

    fn get_user_segments(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .segments
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    fn set_user_segments(&self, user_id: &str, segments: &[String]) -> Result<()> {
        self.state
            .write()
            .segments
            .insert(user_id.to_string(), segments.to_vec());
        Ok(())
    }

    fn set_feature_flags(&self, application_id: &str, flags: &FlagMap) -> Result<()> {
        let mut state = self.state.write();
        let current = state.flags.entry(application_id.to_string()).or_default();
        for (key, value) in flags {
            current.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn get_feature_flags(&self, application_id: &str) -> Result<FlagMap> {
        Ok(self
            .state
            .read()
            .flags
            .get(application_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExperimentStatus;
    use crate::test_utils::fixtures::{event, two_arm_experiment};

    #[test]
    fn create_rejects_duplicates() {
        let store = MemoryStore::new();
        let exp = two_arm_experiment("exp-dup");
        store.create_experiment(&exp).unwrap();
        assert!(store.create_experiment(&exp).is_err());
    }

    #[test]
    fn update_unknown_experiment_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_experiment("ghost", &ExperimentUpdate::status(ExperimentStatus::Paused))
            .unwrap_err();
        assert!(matches!(err, XpError::ExperimentNotFound(_)));
    }

    #[test]
    fn assignment_is_last_write_wins() {
        let store = MemoryStore::new();
        let mut assignment = UserAssignment {
            experiment_id: "exp".to_string(),
            user_id: "u1".to_string(),
            variant_id: "control".to_string(),
            assigned_at: Utc::now(),
        };
        store.set_assignment(&assignment).unwrap();
        assignment.variant_id = "treatment".to_string();
        store.set_assignment(&assignment).unwrap();
        let stored = store.get_assignment("exp", "u1").unwrap().unwrap();
        assert_eq!(stored.variant_id, "treatment");
        assert_eq!(store.clear_assignments("exp").unwrap(), 1);
        assert!(store.get_assignment("exp", "u1").unwrap().is_none());
    }

    #[test]
    fn events_filter_by_metric_and_variant() {
        let store = MemoryStore::new();
        store
            .add_events(&[
                event("exp", "u1", "control", "clicks", 1.0),
                event("exp", "u2", "treatment", "clicks", 2.0),
                event("exp", "u2", "treatment", "revenue", 9.0),
                event("other", "u3", "control", "clicks", 1.0),
            ])
            .unwrap();
        assert_eq!(store.get_events("exp", None).unwrap().len(), 3);
        assert_eq!(store.get_events("exp", Some("clicks")).unwrap().len(), 2);
        assert_eq!(store.get_events_by_variant("exp", "treatment").unwrap().len(), 2);
    }

    #[test]
    fn feature_flags_merge() {
        let store = MemoryStore::new();
        let mut first = FlagMap::new();
        first.insert("a".to_string(), serde_json::json!(true));
        first.insert("b".to_string(), serde_json::json!(1));
        store.set_feature_flags("app", &first).unwrap();
        let mut second = FlagMap::new();
        second.insert("b".to_string(), serde_json::json!(2));
        store.set_feature_flags("app", &second).unwrap();

        let flags = store.get_feature_flags("app").unwrap();
        assert_eq!(flags["a"], serde_json::json!(true));
        assert_eq!(flags["b"], serde_json::json!(2));
    }
}
