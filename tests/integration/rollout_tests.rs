use chrono::Duration;

use xpilot::autopilot::AutoPilotAction;
use xpilot::core::{
    Actor, DecisionAction, DecisionType, ExperimentEvent, ExperimentStatus, FeedbackType,
    Sentiment,
};
use xpilot::evaluation::{GuardrailStatus, Recommendation};
use xpilot::feedback::FeedbackInput;
use xpilot::services::AlertSeverity;
use xpilot::storage::ExperimentStore;
use xpilot::test_utils::fixtures::{event, fixed_now, two_arm_experiment};
use xpilot::test_utils::logging::TestLogger;

use super::fixture::SqliteEngine;

fn conversions(
    experiment_id: &str,
    variant: &str,
    users: usize,
    converted: usize,
) -> Vec<ExperimentEvent> {
    (0..users)
        .map(|i| {
            let value = if i < converted { 1.0 } else { 0.0 };
            event(experiment_id, &format!("{variant}-u{i}"), variant, "conversion", value)
        })
        .collect()
}

#[test]
fn guardrail_breach_rolls_back_once() {
    let log = TestLogger::new("guardrail_breach_rolls_back_once");
    let engine = SqliteEngine::new("guardrail_breach_rolls_back_once");
    let exp = two_arm_experiment("exp-guard");
    engine.app.autopilot.create_experiment(&exp).unwrap();
    engine.force_assignment("exp-guard", "u-treat", "treatment");

    log.step("record error_rate 0.1 for a treatment user");
    let recorded = engine
        .app
        .tracker
        .track_event("exp-guard", "u-treat", "error_rate", 0.1)
        .unwrap()
        .expect("assigned user records");
    assert_eq!(recorded.variant_id, "treatment");

    log.step("evaluate");
    let evaluation = engine.app.evaluator.evaluate_experiment("exp-guard").unwrap();
    log.log_actual(&evaluation.recommendation);
    assert_eq!(evaluation.guardrail_status, GuardrailStatus::Breached);
    assert_eq!(evaluation.recommendation, Recommendation::RollBack);
    assert!(evaluation.reason.starts_with("Guardrail metric breached"));

    log.step("run auto-pilot");
    let outcome = engine.app.autopilot.run_autopilot("exp-guard").unwrap();
    assert_eq!(outcome.action, AutoPilotAction::RolledBack);
    assert_eq!(outcome.status, ExperimentStatus::RolledBack);

    let reopened = engine.reopen();
    let stored = reopened.get_experiment("exp-guard").unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::RolledBack);
    assert_eq!(stored.decision, Some(DecisionType::RollBack));
    assert_eq!(stored.decision_by, Some(Actor::Auto));

    let logs = reopened.get_decision_logs("exp-guard").unwrap();
    let rollbacks: Vec<_> = logs
        .iter()
        .filter(|entry| entry.action == DecisionAction::RollBack)
        .collect();
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].actor, Actor::Auto);
    assert!(rollbacks[0].evaluation.is_some());

    let flags = reopened.get_feature_flags("app-1").unwrap();
    assert_eq!(flags["new_checkout"], serde_json::json!(false));
    assert_eq!(engine.alerts.count(AlertSeverity::Critical), 1);

    log.step("a second run is refused");
    let err = engine.app.autopilot.run_autopilot("exp-guard").unwrap_err();
    assert!(matches!(err, xpilot::XpError::NotRunning { .. }));
    assert_eq!(reopened.get_decision_logs("exp-guard").unwrap().len(), logs.len());
    log.pass();
}

#[test]
fn clear_winner_rolls_forward() {
    let log = TestLogger::new("clear_winner_rolls_forward");
    let engine = SqliteEngine::new("clear_winner_rolls_forward");
    engine
        .app
        .autopilot
        .create_experiment(&two_arm_experiment("exp-win"))
        .unwrap();

    let mut events = conversions("exp-win", "control", 200, 20);
    events.extend(conversions("exp-win", "treatment", 200, 60));
    engine.store.add_events(&events).unwrap();

    let outcome = engine.app.autopilot.run_autopilot("exp-win").unwrap();
    log.log_actual(&outcome.reason);
    assert_eq!(outcome.recommendation, Recommendation::RollForward);
    assert_eq!(outcome.action, AutoPilotAction::RolledForward);
    assert_eq!(outcome.winner.as_deref(), Some("treatment"));
    assert_eq!(outcome.reason, "All success criteria met, promoted treatment");

    let comparison = outcome.evaluation.comparison("treatment", "conversion").unwrap();
    assert!(comparison.is_significant);
    assert!((comparison.lift - 2.0).abs() < 1e-9);

    let stored = engine.store.get_experiment("exp-win").unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::Completed);
    assert_eq!(
        engine.store.get_feature_flags("app-1").unwrap()["new_checkout"],
        serde_json::json!(true)
    );
    assert_eq!(engine.alerts.count(AlertSeverity::Info), 1);
    log.pass();
}

#[test]
fn quiet_experiment_only_logs_insufficient_data() {
    let engine = SqliteEngine::new("quiet_experiment_only_logs_insufficient_data");
    engine
        .app
        .autopilot
        .create_experiment(&two_arm_experiment("exp-quiet"))
        .unwrap();

    let outcome = engine.app.autopilot.run_autopilot("exp-quiet").unwrap();
    assert_eq!(outcome.recommendation, Recommendation::InsufficientData);
    assert_eq!(outcome.reason, "No events recorded yet");
    assert_eq!(outcome.action, AutoPilotAction::NoChange);

    let logs = engine.store.get_decision_logs("exp-quiet").unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, DecisionAction::InsufficientData);
    assert_eq!(
        engine.store.get_experiment("exp-quiet").unwrap().unwrap().status,
        ExperimentStatus::Running
    );
    assert!(engine.alerts.sent().is_empty());
}

#[test]
fn past_end_date_pauses_for_review() {
    let engine = SqliteEngine::new("past_end_date_pauses_for_review");
    let mut exp = two_arm_experiment("exp-ended");
    exp.end_date = Some(fixed_now() - Duration::hours(1));
    engine.app.autopilot.create_experiment(&exp).unwrap();

    let mut events = conversions("exp-ended", "control", 100, 10);
    events.extend(conversions("exp-ended", "treatment", 100, 11));
    engine.store.add_events(&events).unwrap();

    let outcome = engine.app.autopilot.run_autopilot("exp-ended").unwrap();
    assert_eq!(outcome.recommendation, Recommendation::Extend);
    assert_eq!(outcome.action, AutoPilotAction::Paused);

    let stored = engine.store.get_experiment("exp-ended").unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::Paused);
    assert!(stored.decision.is_none());
    assert_eq!(engine.alerts.count(AlertSeverity::Warning), 1);
}

#[test]
fn negative_feedback_spike_triggers_rollback() {
    let log = TestLogger::new("negative_feedback_spike_triggers_rollback");
    let engine = SqliteEngine::new("negative_feedback_spike_triggers_rollback");
    engine
        .app
        .autopilot
        .create_experiment(&two_arm_experiment("exp-fb"))
        .unwrap();
    engine
        .store
        .add_event(&event("exp-fb", "bad-user", "treatment", "error_rate", 0.2))
        .unwrap();

    let min_signals = engine.app.config.feedback.min_signals;
    for i in 0..min_signals {
        let user = format!("fb-u{i}");
        engine.force_assignment("exp-fb", &user, "treatment");
        let report = engine
            .app
            .feedback
            .receive(
                "app-1",
                &FeedbackInput {
                    user_id: user,
                    feedback_type: FeedbackType::Ticket,
                    sentiment: Sentiment::Negative,
                    score: None,
                    message: Some("checkout broke".to_string()),
                    timestamp: None,
                },
            )
            .unwrap();
        log.log_actual(&report.triggered.len());
        assert_eq!(report.recorded.len(), 1);
        if i + 1 < min_signals {
            assert!(report.triggered.is_empty(), "triggered early at signal {i}");
        } else {
            assert_eq!(report.triggered.len(), 1);
            let run = &report.triggered[0];
            assert_eq!(run.signals, min_signals);
            assert!((run.negative_ratio - 1.0).abs() < f64::EPSILON);
            let outcome = run.outcome.as_ref().expect("auto-pilot ran");
            assert_eq!(outcome.status, ExperimentStatus::RolledBack);
        }
    }

    assert_eq!(engine.store.get_feedback("exp-fb", None).unwrap().len(), min_signals);
    log.pass();
}

#[test]
fn unassigned_feedback_is_not_recorded() {
    let engine = SqliteEngine::new("unassigned_feedback_is_not_recorded");
    engine
        .app
        .autopilot
        .create_experiment(&two_arm_experiment("exp-fb-none"))
        .unwrap();

    let report = engine
        .app
        .feedback
        .receive(
            "app-1",
            &FeedbackInput {
                user_id: "stranger".to_string(),
                feedback_type: FeedbackType::Rating,
                sentiment: Sentiment::Negative,
                score: Some(1.0),
                message: None,
                timestamp: None,
            },
        )
        .unwrap();
    assert!(report.recorded.is_empty());
    assert!(report.triggered.is_empty());
}

#[test]
fn sweep_isolates_failures_per_experiment() {
    let engine = SqliteEngine::new("sweep_isolates_failures_per_experiment");
    engine
        .app
        .autopilot
        .create_experiment(&two_arm_experiment("exp-a"))
        .unwrap();
    let mut other = two_arm_experiment("exp-b");
    other.application_id = "app-2".to_string();
    engine.app.autopilot.create_experiment(&other).unwrap();
    engine
        .store
        .add_event(&event("exp-b", "u1", "treatment", "error_rate", 0.5))
        .unwrap();

    let report = engine.app.autopilot.run_sweep(None).unwrap();
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.failures(), 0);
    assert_eq!(report.changed(), 1);

    let scoped = engine.app.autopilot.run_sweep(Some("app-1")).unwrap();
    assert_eq!(scoped.entries.len(), 1);
    assert_eq!(scoped.entries[0].experiment_id, "exp-a");
}

#[test]
fn manual_lifecycle_survives_reopen() {
    let engine = SqliteEngine::new("manual_lifecycle_survives_reopen");
    let mut exp = two_arm_experiment("exp-manual");
    exp.status = ExperimentStatus::Draft;
    engine.app.autopilot.create_experiment(&exp).unwrap();

    engine.app.autopilot.start("exp-manual").unwrap();
    engine.app.autopilot.pause("exp-manual", "holiday freeze").unwrap();
    engine.app.autopilot.resume("exp-manual").unwrap();
    let graduated = engine.app.autopilot.graduate_rollout("exp-manual", 25.0).unwrap();
    assert_eq!(graduated.status, ExperimentStatus::Running);
    engine
        .app
        .autopilot
        .roll_forward("exp-manual", "treatment", "product sign-off")
        .unwrap();

    let reopened = engine.reopen();
    let stored = reopened.get_experiment("exp-manual").unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::Completed);
    assert_eq!(stored.decision_by, Some(Actor::Manual));
    let actions: Vec<_> = reopened
        .get_decision_logs("exp-manual")
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            DecisionAction::Start,
            DecisionAction::Pause,
            DecisionAction::Resume,
            DecisionAction::Graduate,
            DecisionAction::RollForward,
        ]
    );
}
