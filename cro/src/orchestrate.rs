//! The orchestration loop: decide, invoke, record, persist.
//!
//! One run owns one [`RunState`] and is the only writer to it. Every run ends
//! in exactly one [`LoopStop`] and always leaves a summary on disk.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::agents::decider::Decider;
use crate::core::decision::{NextStep, classify};
use crate::core::registry::AgentRegistry;
use crate::core::state::RunState;
use crate::core::types::{AgentOutcome, LoopStop, StepRecord};
use crate::invoke::invoke;
use crate::io::archive::{RunArchive, RunSummary};

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub target_company: String,
    pub origin_company: String,
    pub output_dir: PathBuf,
    /// Safety cap on executed steps.
    pub max_steps: u32,
}

/// How a run ended and where its files are.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub stop: LoopStop,
    pub summary: RunSummary,
    pub archive_dir: PathBuf,
    pub summary_path: PathBuf,
}

/// Run the loop until the decider stops it, names an unknown agent, or
/// `max_steps` steps have executed.
///
/// Agent failures never end the run; they are recorded and the loop moves on.
/// Only invalid parameters and failures to create the archive folder or write
/// the summary are returned as errors. `on_step` sees each history record as
/// it is appended.
#[instrument(skip_all, fields(target = %request.target_company, origin = %request.origin_company, max_steps = request.max_steps))]
pub fn run_orchestration<D: Decider + ?Sized, F: FnMut(&StepRecord)>(
    registry: &AgentRegistry,
    decider: &D,
    request: &RunRequest,
    mut on_step: F,
) -> Result<RunOutcome> {
    if request.max_steps == 0 {
        bail!("max_steps must be > 0");
    }
    if request.target_company.trim().is_empty() {
        bail!("target company must be non-empty");
    }
    if request.origin_company.trim().is_empty() {
        bail!("origin company must be non-empty");
    }

    let archive = RunArchive::create(
        &request.output_dir,
        &request.target_company,
        &request.origin_company,
    )?;
    let names = registry.list_names();
    let mut state = RunState::new(&request.target_company, &request.origin_company, &names);
    info!(agents = names.len(), dir = %archive.dir().display(), "run started");

    let mut stop = None;
    for step in 1..=request.max_steps {
        let decision = decider.decide(&state.snapshot(&names));
        let descriptor = match classify(&decision, registry) {
            NextStep::Stop => {
                info!(step, reason = %decision.reason, "stopped by decision");
                stop = Some(LoopStop::StoppedByDecision {
                    reason: decision.reason,
                });
                break;
            }
            NextStep::Unknown => {
                warn!(step, agent = %decision.agent, "decider chose an unknown agent");
                stop = Some(LoopStop::StoppedInvalidAgent {
                    agent: decision.agent,
                    reason: decision.reason,
                });
                break;
            }
            NextStep::Run(descriptor) => descriptor,
        };

        let agent = descriptor.name.as_str();
        let invocation = invoke(descriptor, &state);
        match invocation.outcome {
            AgentOutcome::Success(output) => {
                state.record_success(step, agent, invocation.inputs, output);
            }
            AgentOutcome::Failure(failure) => {
                state.record_failure(step, agent, invocation.inputs, &failure);
            }
        }

        if let Some(output) = state.output(agent) {
            // A lost step file must not end the run; the summary still carries the output.
            if let Err(err) = archive.write_step(step, agent, output) {
                warn!(step, agent, err = %format!("{err:#}"), "failed to persist step");
            }
        }
        if let Some(record) = state.history().last() {
            info!(step, agent, status = ?record.status, "step finished");
            on_step(record);
        }
    }
    let stop = stop.unwrap_or(LoopStop::StoppedStepLimit {
        max_steps: request.max_steps,
    });

    let (run_counts, steps, final_outputs) = state.into_parts();
    let summary = RunSummary::new(
        &request.target_company,
        &request.origin_company,
        stop.clone(),
        run_counts,
        steps,
        final_outputs,
    );
    let summary_path = archive
        .write_summary(&summary)
        .context("write run summary")?;
    info!(state = stop.label(), steps = summary.steps.len(), "run finished");

    Ok(RunOutcome {
        stop,
        summary,
        archive_dir: archive.dir().to_path_buf(),
        summary_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::Decision;
    use crate::test_support::{ScriptedDecider, registry_a};

    fn request(dir: &std::path::Path, max_steps: u32) -> RunRequest {
        RunRequest {
            target_company: "acme.com".to_string(),
            origin_company: "Initech".to_string(),
            output_dir: dir.to_path_buf(),
            max_steps,
        }
    }

    #[test]
    fn rejects_zero_max_steps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_orchestration(
            &registry_a(),
            &ScriptedDecider::default(),
            &request(temp.path(), 0),
            |_| {},
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_steps must be > 0"));
    }

    #[test]
    fn rejects_blank_company() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request(temp.path(), 3);
        req.origin_company = "  ".to_string();
        let err = run_orchestration(&registry_a(), &ScriptedDecider::default(), &req, |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("origin company"));
    }

    #[test]
    fn steps_are_reported_and_persisted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let decider = ScriptedDecider::new(vec![
            Decision::run("A", "first"),
            Decision::stop("done"),
        ]);
        let mut seen = Vec::new();
        let outcome = run_orchestration(&registry_a(), &decider, &request(temp.path(), 5), |r| {
            seen.push(r.step);
        })
        .expect("run");

        assert_eq!(seen, vec![1]);
        assert_eq!(
            outcome.stop,
            LoopStop::StoppedByDecision {
                reason: "done".to_string()
            }
        );
        assert_eq!(outcome.archive_dir, temp.path().join("acme_com__Initech"));
        assert!(outcome.archive_dir.join("01_A.json").is_file());
        assert!(outcome.summary_path.is_file());
        assert_eq!(decider.calls(), 2);
    }
}
