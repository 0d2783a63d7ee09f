//! Next-step decider.
//!
//! The loop treats the decider as an untrusted oracle: whatever it answers is
//! membership-checked against the registry before anything runs. The decider
//! itself never fails; errors turn into a stop decision carrying the message.

use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::decision::{Decision, parse_decision};
use crate::core::state::StateSnapshot;
use crate::io::executor::{ExecRequest, Executor, execute_and_load_json};
use crate::io::prompt::PromptBuilder;

use super::load_schema;

const DECISION_SCHEMA: &str = include_str!("../../schemas/decision.schema.json");

/// Chooses the next agent to run, or the stop sentinel.
pub trait Decider {
    fn decide(&self, snapshot: &StateSnapshot<'_>) -> Decision;
}

/// Decider backed by a model call with a fixed rules prompt.
pub struct LlmDecider {
    executor: Rc<dyn Executor>,
    model: Option<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl LlmDecider {
    pub fn new(
        executor: Rc<dyn Executor>,
        model: Option<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            executor,
            model,
            timeout,
            output_limit_bytes,
        }
    }

    fn try_decide(&self, snapshot: &StateSnapshot<'_>) -> Result<Decision> {
        // Budget is irrelevant: decider prompts are never trimmed.
        let prompt = PromptBuilder::new(usize::MAX)
            .build_decider(snapshot)?
            .render();
        let request = ExecRequest {
            label: format!("{:02}_decider", snapshot.history.len() + 1),
            prompt,
            output_schema: load_schema("decision", DECISION_SCHEMA)?,
            model: self.model.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        let answer = execute_and_load_json(self.executor.as_ref(), &request)?;
        parse_decision(&answer)
    }
}

impl Decider for LlmDecider {
    #[instrument(skip_all, fields(step = snapshot.history.len() + 1))]
    fn decide(&self, snapshot: &StateSnapshot<'_>) -> Decision {
        match self.try_decide(snapshot) {
            Ok(decision) => {
                info!(agent = %decision.agent, reason = %decision.reason, "decision");
                decision
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "decider failed, stopping");
                Decision::stop(format!("decision failed: {err:#}"))
            }
        }
    }
}
