//! Per-run mutable state owned by the orchestration loop.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::types::{AgentFailure, OutputKeys, RunParam, StepRecord, StepStatus};

/// State of one run. Created empty, mutated only by the loop, then handed off.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    target_company: String,
    origin_company: String,
    outputs: BTreeMap<String, Value>,
    run_counts: BTreeMap<String, u32>,
    history: Vec<StepRecord>,
}

impl RunState {
    /// Start a run with every known agent at a zero run count.
    pub fn new(target_company: &str, origin_company: &str, agent_names: &[String]) -> Self {
        Self {
            target_company: target_company.to_string(),
            origin_company: origin_company.to_string(),
            outputs: BTreeMap::new(),
            run_counts: agent_names.iter().map(|name| (name.clone(), 0)).collect(),
            history: Vec::new(),
        }
    }

    pub fn param(&self, param: RunParam) -> &str {
        match param {
            RunParam::TargetCompany => &self.target_company,
            RunParam::OriginCompany => &self.origin_company,
        }
    }

    /// Most recent output of `agent`, if it has produced one (success or failure marker).
    pub fn output(&self, agent: &str) -> Option<&Value> {
        self.outputs.get(agent)
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    pub fn run_count(&self, agent: &str) -> u32 {
        self.run_counts.get(agent).copied().unwrap_or(0)
    }

    pub fn run_counts(&self) -> &BTreeMap<String, u32> {
        &self.run_counts
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Record a successful step: count it, overwrite the output, append history.
    pub fn record_success(&mut self, step: u32, agent: &str, inputs: Vec<String>, output: Value) {
        *self.run_counts.entry(agent.to_string()).or_insert(0) += 1;
        self.history.push(StepRecord {
            step,
            agent: agent.to_string(),
            inputs,
            output_keys: OutputKeys::of(&output),
            status: StepStatus::Success,
            error: None,
        });
        self.outputs.insert(agent.to_string(), output);
    }

    /// Record a failed step. The failure marker replaces the agent's output;
    /// the run count is left untouched.
    pub fn record_failure(
        &mut self,
        step: u32,
        agent: &str,
        inputs: Vec<String>,
        failure: &AgentFailure,
    ) {
        let marker = failure.to_output();
        self.history.push(StepRecord {
            step,
            agent: agent.to_string(),
            inputs,
            output_keys: OutputKeys::of(&marker),
            status: StepStatus::Failure,
            error: Some(failure.to_string()),
        });
        self.outputs.insert(agent.to_string(), marker);
    }

    /// Read-only view handed to the decider.
    pub fn snapshot<'a>(&'a self, available_agents: &'a [String]) -> StateSnapshot<'a> {
        StateSnapshot {
            target_company: &self.target_company,
            origin_company: &self.origin_company,
            run_counts: &self.run_counts,
            history: &self.history,
            available_agents,
        }
    }

    /// Consume the state, yielding `(run_counts, history, outputs)`.
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<String, u32>,
        Vec<StepRecord>,
        BTreeMap<String, Value>,
    ) {
        (self.run_counts, self.history, self.outputs)
    }
}

/// Everything the decider may see. Serializes to the decider boundary shape.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StateSnapshot<'a> {
    pub target_company: &'a str,
    pub origin_company: &'a str,
    pub run_counts: &'a BTreeMap<String, u32>,
    pub history: &'a [StepRecord],
    pub available_agents: &'a [String],
}
