use std::path::PathBuf;

use serde_json::Value;

use super::fixture::{CHECKOUT_DEFINITION, CliFixture};
use crate::assert_command_success;

fn create_checkout(fixture: &CliFixture) -> PathBuf {
    let definition = fixture.write_file("checkout.json", CHECKOUT_DEFINITION);
    let path = definition.to_str().unwrap();
    assert_command_success!(fixture.run(&["--machine", "create", "--file", path]));
    definition
}

/// First user the binary buckets into `variant`.
fn user_in_variant(fixture: &CliFixture, experiment: &str, variant: &str) -> String {
    for i in 0..200 {
        let user = format!("user-{i}");
        let output = fixture.run(&["--machine", "assign", experiment, &user]);
        assert_command_success!(output);
        if output.json()["assignment"]["variant"]["id"] == variant {
            return user;
        }
    }
    panic!("no user landed in {variant}");
}

#[test]
fn test_guardrail_workflow_through_cli() {
    let fixture = CliFixture::new("test_guardrail_workflow_through_cli");
    let definition = fixture.write_file("checkout.json", CHECKOUT_DEFINITION);

    let path = definition.to_str().unwrap();
    let create = fixture.run(&["--machine", "create", "--file", path]);
    assert_command_success!(create);
    assert_eq!(create.json()["experiment"]["status"], "draft");

    let start = fixture.run(&["--machine", "start", "checkout-v2"]);
    assert_command_success!(start);
    assert_eq!(start.json()["experiment"]["status"], "running");

    let user = user_in_variant(&fixture, "checkout-v2", "treatment");

    let track = fixture.run(&["--machine", "track", "checkout-v2", &user, "error_rate", "0.1"]);
    assert_command_success!(track);
    let track_json = track.json();
    assert_eq!(track_json["recorded"], true);
    assert_eq!(track_json["event"]["variant_id"], "treatment");

    let evaluate = fixture.run(&["--machine", "evaluate", "checkout-v2"]);
    assert_command_success!(evaluate);
    let evaluation = &evaluate.json()["evaluation"];
    assert_eq!(evaluation["guardrail_status"], "breached");
    assert_eq!(evaluation["recommendation"], "roll_back");

    let autopilot = fixture.run(&["--machine", "autopilot", "checkout-v2"]);
    assert_command_success!(autopilot);
    let outcome = &autopilot.json()["outcome"];
    assert_eq!(outcome["action"], "rolled_back");
    assert_eq!(outcome["status"], "rolled_back");

    let show = fixture.run(&["--machine", "show", "checkout-v2", "--logs"]);
    assert_command_success!(show);
    let show_json = show.json();
    assert_eq!(show_json["experiment"]["status"], "rolled_back");
    let log = show_json["decision_log"].as_array().unwrap();
    let actions: Vec<&str> = log.iter().filter_map(|entry| entry["action"].as_str()).collect();
    assert_eq!(actions, vec!["start", "roll_back"]);

    let flags = fixture.run(&["--machine", "flags", "shop"]);
    assert_command_success!(flags);
    assert_eq!(flags.json()["flags"]["one_page_checkout"], false);
}

#[test]
fn test_unassigned_event_is_dropped() {
    let fixture = CliFixture::new("test_unassigned_event_is_dropped");
    create_checkout(&fixture);
    assert_command_success!(fixture.run(&["--machine", "start", "checkout-v2"]));

    let track = fixture.run(&["--machine", "track", "checkout-v2", "nobody", "conversion", "1"]);
    assert_command_success!(track);
    let json = track.json();
    assert_eq!(json["recorded"], false);
    assert_eq!(json["event"], Value::Null);
}

#[test]
fn test_batch_tracking_reports_each_entry() {
    let fixture = CliFixture::new("test_batch_tracking_reports_each_entry");
    create_checkout(&fixture);
    assert_command_success!(fixture.run(&["--machine", "start", "checkout-v2"]));
    assert_command_success!(fixture.run(&["--machine", "assign", "checkout-v2", "u1"]));

    let batch = fixture.write_file(
        "events.json",
        r#"[
            {"experiment_id": "checkout-v2", "user_id": "u1", "metric_id": "conversion", "value": 1},
            {"experiment_id": "checkout-v2", "user_id": "ghost", "metric_id": "conversion", "value": 1},
            {"experiment_id": "missing", "user_id": "u1", "metric_id": "conversion", "value": 1}
        ]"#,
    );
    let output = fixture.run(&["--machine", "track", "--batch", batch.to_str().unwrap()]);
    assert_command_success!(output);
    let outcome = &output.json()["outcome"];
    assert_eq!(outcome["recorded"], 1);
    assert_eq!(outcome["skipped"], 1);
    assert_eq!(outcome["failed"][0]["index"], 2);
}

#[test]
fn test_manual_controls_and_errors() {
    let fixture = CliFixture::new("test_manual_controls_and_errors");
    create_checkout(&fixture);

    let pause_draft = fixture.run(&["--machine", "pause", "checkout-v2"]);
    assert!(!pause_draft.success);
    assert_eq!(pause_draft.json()["code"], "INVALID_TRANSITION");

    assert_command_success!(fixture.run(&["--machine", "start", "checkout-v2"]));

    let graduate = fixture.run(&["--machine", "graduate", "checkout-v2", "25"]);
    assert_command_success!(graduate);
    assert_eq!(graduate.json()["experiment"]["cohort"]["percentage"], 25.0);

    let bad = fixture.run(&["--machine", "graduate", "checkout-v2", "150"]);
    assert!(!bad.success);
    let bad_json = bad.json();
    assert_eq!(bad_json["error"], true);
    assert_eq!(bad_json["code"], "INVALID_PERCENTAGE");

    let ghost = fixture.run(&["--machine", "rollforward", "checkout-v2", "ghost"]);
    assert!(!ghost.success);
    assert_eq!(ghost.json()["code"], "VARIANT_NOT_FOUND");

    let forward = fixture.run(&["--machine", "rollforward", "checkout-v2", "treatment"]);
    assert_command_success!(forward);
    assert_eq!(forward.json()["experiment"]["status"], "completed");

    let flags = fixture.run(&["--machine", "flags", "shop"]);
    assert_eq!(flags.json()["flags"]["one_page_checkout"], true);

    let missing = fixture.run(&["--machine", "show", "nope"]);
    assert!(!missing.success);
    assert_eq!(missing.json()["code"], "EXPERIMENT_NOT_FOUND");
}

#[test]
fn test_duplicate_create_is_rejected() {
    let fixture = CliFixture::new("test_duplicate_create_is_rejected");
    let definition = create_checkout(&fixture);

    let path = definition.to_str().unwrap();
    let again = fixture.run(&["--machine", "create", "--file", path]);
    assert!(!again.success);
    assert_eq!(again.json()["code"], "VALIDATION_FAILED");

    let list = fixture.run(&["--machine", "list", "--status", "draft"]);
    assert_command_success!(list);
    assert_eq!(list.json()["count"], 1);
}

#[test]
fn test_segments_and_presets() {
    let fixture = CliFixture::new("test_segments_and_presets");

    let set = fixture.run(&["--machine", "segments", "u1", "--set", "beta,staff"]);
    assert_command_success!(set);
    let segments = set.json()["segments"].as_array().unwrap().len();
    assert_eq!(segments, 2);

    let presets = fixture.run_with_db(None, &["--machine", "presets", "conversion"]);
    assert_command_success!(presets);
    assert_eq!(presets.json()["presets"][0]["name"], "conversion");

    let size = fixture.run_with_db(None, &["--machine", "sample-size", "0.1", "0.2"]);
    assert_command_success!(size);
    assert!(size.json()["per_variant"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_human_output_for_show() {
    let fixture = CliFixture::new("test_human_output_for_show");
    let definition = fixture.write_file("checkout.json", CHECKOUT_DEFINITION);
    let path = definition.to_str().unwrap();
    assert_command_success!(fixture.run(&["create", "--file", path]));

    let show = fixture.run(&["show", "checkout-v2"]);
    assert_command_success!(show);
    assert!(show.stdout.contains("Checkout v2"));
    assert!(show.stdout.contains("Variants"));
    assert!(show.stdout.contains("control 50% (control)"));
}
