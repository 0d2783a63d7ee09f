//! End-to-end loop behaviour through the public API.
//!
//! Uses scripted deciders and closure agents; no model or search process is spawned.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use serde_json::{Value, json};

use cro::core::decision::Decision;
use cro::core::registry::{AgentDescriptor, AgentRegistry};
use cro::core::types::{InputSlot, LoopStop, RunParam, StepStatus};
use cro::io::archive::{SUMMARY_FILE_NAME, read_summary};
use cro::orchestrate::{RunOutcome, RunRequest, run_orchestration};
use cro::test_support::{
    RepeatDecider, ScriptedDecider, echo_agent, failing_agent, panicking_agent, registry_a,
    registry_a_b,
};

fn request(dir: &std::path::Path, max_steps: u32) -> RunRequest {
    RunRequest {
        target_company: "acme.com".to_string(),
        origin_company: "initech.com".to_string(),
        output_dir: dir.to_path_buf(),
        max_steps,
    }
}

fn run(
    registry: &AgentRegistry,
    decider: &ScriptedDecider,
    max_steps: u32,
) -> (tempfile::TempDir, RunOutcome) {
    let temp = tempfile::tempdir().expect("tempdir");
    let outcome =
        run_orchestration(registry, decider, &request(temp.path(), max_steps), |_| {}).expect("run");
    (temp, outcome)
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json")
}

#[test]
fn stop_at_first_step_records_nothing() {
    let decider = ScriptedDecider::new(vec![Decision::stop("nothing to do")]);
    let (_temp, outcome) = run(&registry_a(), &decider, 24);

    assert!(outcome.summary.steps.is_empty());
    assert_eq!(
        outcome.stop,
        LoopStop::StoppedByDecision {
            reason: "nothing to do".to_string()
        }
    );
    assert!(outcome.summary.final_outputs.is_empty());
    assert_eq!(outcome.summary.run_counts.get("A"), Some(&0));
    assert_eq!(decider.calls(), 1);

    let files: Vec<String> = fs::read_dir(&outcome.archive_dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec![SUMMARY_FILE_NAME.to_string()]);
}

#[test]
fn missing_dependency_fails_the_step_and_the_run_continues() {
    let decider = ScriptedDecider::agents(&["B", "A", "B"]);
    let (_temp, outcome) = run(&registry_a_b(), &decider, 24);
    let steps = &outcome.summary.steps;

    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].agent, "B");
    assert_eq!(steps[0].status, StepStatus::Failure);
    assert!(steps[0].inputs.is_empty());
    assert!(
        steps[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("requires output of 'A'"))
    );

    // Step 2 ran after the failure; the decider saw the failed record.
    let snapshots = decider.snapshots();
    let second_snapshot = &snapshots[1];
    assert_eq!(second_snapshot["history"][0]["status"], "failure");
    assert_eq!(second_snapshot["run_counts"]["B"], 0);

    let step_one = read_json(&outcome.archive_dir.join("01_B.json"));
    assert_eq!(step_one["failure"]["kind"], "missing_dependency");
    assert_eq!(step_one["failure"]["agent"], "A");

    assert_eq!(steps[2].status, StepStatus::Success);
    assert_eq!(steps[2].inputs, vec!["a_json"]);
    assert_eq!(outcome.summary.run_counts["A"], 1);
    assert_eq!(outcome.summary.run_counts["B"], 1);
}

#[test]
fn failure_marker_is_the_output_until_a_success_replaces_it() {
    let decider = ScriptedDecider::agents(&["B"]);
    let (_temp, outcome) = run(&registry_a_b(), &decider, 24);

    assert_eq!(outcome.summary.run_counts["B"], 0);
    assert_eq!(
        outcome.summary.final_outputs["B"]["failure"],
        json!({"kind": "missing_dependency", "slot": "a_json", "agent": "A"})
    );
    assert!(!outcome.summary.final_outputs.contains_key("A"));
}

#[test]
fn never_stopping_decider_hits_the_step_limit() {
    let calls = Rc::new(RefCell::new(0));
    let mut registry = AgentRegistry::new();
    registry
        .register(AgentDescriptor::new("A", echo_agent("A", calls.clone()), Vec::new()))
        .expect("register");
    let decider = RepeatDecider {
        agent: "A".to_string(),
    };
    let temp = tempfile::tempdir().expect("tempdir");

    let outcome =
        run_orchestration(&registry, &decider, &request(temp.path(), 3), |_| {}).expect("run");

    assert_eq!(outcome.stop, LoopStop::StoppedStepLimit { max_steps: 3 });
    assert_eq!(outcome.summary.steps.len(), 3);
    assert_eq!(outcome.summary.run_counts["A"], 3);
    assert_eq!(*calls.borrow(), 3);
    for step in 1..=3 {
        assert!(outcome.archive_dir.join(format!("0{step}_A.json")).is_file());
    }
}

#[test]
fn unknown_agent_stops_without_invoking_anything() {
    let decider = ScriptedDecider::agents(&["A", "ZZZ", "A"]);
    let (_temp, outcome) = run(&registry_a(), &decider, 24);

    assert_eq!(outcome.summary.steps.len(), 1);
    assert_eq!(
        outcome.stop,
        LoopStop::StoppedInvalidAgent {
            agent: "ZZZ".to_string(),
            reason: "scripted ZZZ".to_string()
        }
    );
    assert!(!outcome.summary.final_outputs.contains_key("ZZZ"));
    assert!(!outcome.summary.run_counts.contains_key("ZZZ"));
    assert_eq!(decider.calls(), 2);
}

#[test]
fn stop_sentinel_is_case_sensitive() {
    let decider = ScriptedDecider::agents(&["stop"]);
    let (_temp, outcome) = run(&registry_a(), &decider, 24);
    assert_eq!(outcome.stop.label(), "stopped_invalid_agent");
}

#[test]
fn errors_and_panics_degrade_one_step_only() {
    let mut registry = AgentRegistry::new();
    registry
        .register(AgentDescriptor::new("flaky", failing_agent("upstream 503"), Vec::new()))
        .expect("register");
    registry
        .register(AgentDescriptor::new("crashy", panicking_agent("bad index"), Vec::new()))
        .expect("register");
    registry
        .register(AgentDescriptor::new(
            "steady",
            echo_agent("steady", Rc::default()),
            vec![InputSlot::run_param("origin_company", RunParam::OriginCompany)],
        ))
        .expect("register");
    let decider = ScriptedDecider::agents(&["flaky", "crashy", "steady", "STOP"]);
    let (_temp, outcome) = run(&registry, &decider, 24);

    let statuses: Vec<StepStatus> = outcome.summary.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Failure, StepStatus::Failure, StepStatus::Success]
    );
    assert_eq!(outcome.stop.label(), "stopped_by_decision");
    assert_eq!(
        outcome.summary.final_outputs["flaky"]["error"],
        "agent failed: upstream 503"
    );
    assert_eq!(
        outcome.summary.final_outputs["crashy"]["failure"]["message"],
        "panicked: bad index"
    );
    assert_eq!(outcome.summary.run_counts["flaky"], 0);
    assert_eq!(outcome.summary.run_counts["crashy"], 0);
    assert_eq!(outcome.summary.run_counts["steady"], 1);
}

#[test]
fn history_and_counts_stay_consistent() {
    for max_steps in 1..=5 {
        let decider = ScriptedDecider::agents(&["B", "A", "B", "A", "A", "B"]);
        let (_temp, outcome) = run(&registry_a_b(), &decider, max_steps);
        let steps = &outcome.summary.steps;

        assert!(steps.len() <= max_steps as usize);
        for (i, record) in steps.iter().enumerate() {
            assert_eq!(record.step as usize, i + 1);
        }
        for (agent, count) in &outcome.summary.run_counts {
            let successes = steps
                .iter()
                .filter(|r| &r.agent == agent && r.status == StepStatus::Success)
                .count();
            assert_eq!(*count as usize, successes, "run count of {agent}");
        }
    }

    // Script entries after an invalid agent are never consumed.
    let decider = ScriptedDecider::agents(&["A", "B", "B", "ZZ9", "A"]);
    let (_temp, outcome) = run(&registry_a_b(), &decider, 24);
    assert_eq!(outcome.summary.steps.len(), 3);
    assert_eq!(decider.calls(), 4);
}

#[test]
fn decider_sees_the_full_snapshot() {
    let decider = ScriptedDecider::agents(&["A", "B"]);
    let (_temp, _outcome) = run(&registry_a_b(), &decider, 24);
    let snapshots = decider.snapshots();

    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0]["target_company"], "acme.com");
    assert_eq!(snapshots[0]["origin_company"], "initech.com");
    assert_eq!(snapshots[0]["available_agents"], json!(["A", "B"]));
    assert_eq!(snapshots[0]["run_counts"], json!({"A": 0, "B": 0}));
    assert_eq!(snapshots[0]["history"], json!([]));

    let last = &snapshots[2];
    assert_eq!(last["run_counts"], json!({"A": 1, "B": 1}));
    assert_eq!(last["history"][1]["agent"], "B");
    assert_eq!(last["history"][1]["inputs"], json!(["a_json"]));
    assert_eq!(last["history"][1]["output_keys"], json!(["agent", "inputs"]));
}

#[test]
fn summary_file_matches_the_outcome() {
    let decider = ScriptedDecider::agents(&["A", "B", "STOP"]);
    let (_temp, outcome) = run(&registry_a_b(), &decider, 24);

    assert_eq!(
        outcome.summary_path,
        outcome.archive_dir.join(SUMMARY_FILE_NAME)
    );
    assert!(outcome.archive_dir.ends_with("acme_com__initech_com"));
    let on_disk = read_summary(&outcome.summary_path).expect("summary");
    assert_eq!(on_disk, outcome.summary);
    assert_eq!(on_disk.pair, "acme.com -> initech.com");

    let raw = read_json(&outcome.summary_path);
    assert_eq!(raw["stop"]["state"], "stopped_by_decision");
    assert_eq!(raw["steps"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        raw["final_outputs"]["B"],
        json!({"agent": "B", "inputs": ["a_json"]})
    );
}

#[test]
fn rerunning_a_pair_rewrites_identical_step_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = run_orchestration(
        &registry_a(),
        &ScriptedDecider::agents(&["A"]),
        &request(temp.path(), 5),
        |_| {},
    )
    .expect("first run");
    let step_path = first.archive_dir.join("01_A.json");
    let before = fs::read(&step_path).expect("read");

    run_orchestration(
        &registry_a(),
        &ScriptedDecider::agents(&["A"]),
        &request(temp.path(), 5),
        |_| {},
    )
    .expect("second run");
    assert_eq!(fs::read(&step_path).expect("read"), before);
}

#[test]
fn unwritable_step_file_does_not_end_the_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let blocked = temp.path().join("acme_com__initech_com").join("01_A.json");
    fs::create_dir_all(&blocked).expect("block step file");

    let outcome = run_orchestration(
        &registry_a(),
        &ScriptedDecider::agents(&["A", "A"]),
        &request(temp.path(), 24),
        |_| {},
    )
    .expect("run");

    assert_eq!(outcome.summary.steps.len(), 2);
    assert_eq!(outcome.summary.run_counts["A"], 2);
    assert_eq!(outcome.stop.label(), "stopped_by_decision");
    assert!(blocked.is_dir());
    assert!(outcome.archive_dir.join("02_A.json").is_file());
    assert!(outcome.summary_path.is_file());

    let leftovers: Vec<String> = fs::read_dir(&outcome.archive_dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[test]
fn shorter_rerun_leaves_only_its_own_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    run_orchestration(
        &registry_a(),
        &ScriptedDecider::agents(&["A", "A", "A"]),
        &request(temp.path(), 24),
        |_| {},
    )
    .expect("first run");

    let outcome = run_orchestration(
        &registry_a(),
        &ScriptedDecider::agents(&["A"]),
        &request(temp.path(), 24),
        |_| {},
    )
    .expect("second run");

    let mut files: Vec<String> = fs::read_dir(&outcome.archive_dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec![SUMMARY_FILE_NAME.to_string(), "01_A.json".to_string()]);
}
