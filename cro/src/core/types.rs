//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between the registry, the invoker and
//! the loop. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Run-level constant an input slot can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunParam {
    TargetCompany,
    OriginCompany,
}

impl RunParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunParam::TargetCompany => "target_company",
            RunParam::OriginCompany => "origin_company",
        }
    }
}

/// Where an input slot takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    RunParam(RunParam),
    /// Most recent recorded output of the named agent.
    AgentOutput(String),
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::RunParam(param) => write!(f, "{}", param.as_str()),
            InputSource::AgentOutput(agent) => write!(f, "output of {agent}"),
        }
    }
}

/// One named parameter of an agent and its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSlot {
    pub name: String,
    pub source: InputSource,
}

impl InputSlot {
    pub fn run_param(name: &str, param: RunParam) -> Self {
        Self {
            name: name.to_string(),
            source: InputSource::RunParam(param),
        }
    }

    pub fn agent_output(name: &str, agent: &str) -> Self {
        Self {
            name: name.to_string(),
            source: InputSource::AgentOutput(agent.to_string()),
        }
    }
}

/// Why a single step failed. Recorded as the step's output; never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentFailure {
    /// A declared `AgentOutput` input has no recorded output yet.
    MissingDependency { slot: String, agent: String },
    /// The agent itself returned an error or panicked.
    Execution { message: String },
}

impl AgentFailure {
    /// Failure marker stored in `outputs` and written to the step file.
    pub fn to_output(&self) -> Value {
        json!({
            "error": self.to_string(),
            "failure": self,
        })
    }
}

impl fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentFailure::MissingDependency { slot, agent } => write!(
                f,
                "missing dependency: input '{slot}' requires output of '{agent}', which has not been produced"
            ),
            AgentFailure::Execution { message } => write!(f, "agent failed: {message}"),
        }
    }
}

/// Result of invoking one agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    /// Raw agent return value, unmodified.
    Success(Value),
    Failure(AgentFailure),
}

/// Step result classification recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

/// Marker recorded instead of a key list when an output is not a JSON object.
pub const NON_KEYED_MARKER: &str = "non-dict";

/// Top-level shape of a step output, as shown to the decider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputKeys {
    Keys(Vec<String>),
    Marker(String),
}

impl OutputKeys {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                OutputKeys::Keys(keys)
            }
            _ => OutputKeys::Marker(NON_KEYED_MARKER.to_string()),
        }
    }
}

/// Append-only history entry for one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-indexed, strictly increasing, no gaps.
    pub step: u32,
    pub agent: String,
    /// Slot names that resolved before the agent ran (or failed to).
    pub inputs: Vec<String>,
    pub output_keys: OutputKeys,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopStop {
    /// The decider returned the stop sentinel (or failed and defaulted to it).
    StoppedByDecision { reason: String },
    /// The decider named an agent that is not registered.
    StoppedInvalidAgent { agent: String, reason: String },
    /// `max_steps` steps ran without a stop decision.
    StoppedStepLimit { max_steps: u32 },
}

impl LoopStop {
    pub fn label(&self) -> &'static str {
        match self {
            LoopStop::StoppedByDecision { .. } => "stopped_by_decision",
            LoopStop::StoppedInvalidAgent { .. } => "stopped_invalid_agent",
            LoopStop::StoppedStepLimit { .. } => "stopped_step_limit",
        }
    }
}
