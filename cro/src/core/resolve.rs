//! Input resolution against run state.

use serde_json::Value;

use super::registry::{AgentDescriptor, AgentInputs};
use super::state::RunState;
use super::types::{AgentFailure, InputSource};

/// A declared `AgentOutput` input had nothing recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub slot: String,
    pub agent: String,
    /// Slots that resolved before the missing one.
    pub resolved: Vec<String>,
}

impl From<MissingDependency> for AgentFailure {
    fn from(missing: MissingDependency) -> Self {
        AgentFailure::MissingDependency {
            slot: missing.slot,
            agent: missing.agent,
        }
    }
}

/// Resolve every declared slot of `descriptor`, in declaration order.
///
/// Stops at the first slot whose source agent has no recorded output; the agent
/// must then not be called at all.
pub fn resolve_inputs(
    descriptor: &AgentDescriptor,
    state: &RunState,
) -> Result<AgentInputs, MissingDependency> {
    let step = u32::try_from(state.history().len() + 1).unwrap_or(u32::MAX);
    let mut inputs = AgentInputs::at_step(step);
    for slot in &descriptor.inputs {
        let value = match &slot.source {
            InputSource::RunParam(param) => Value::String(state.param(*param).to_string()),
            InputSource::AgentOutput(agent) => match state.output(agent) {
                Some(output) => output.clone(),
                None => {
                    return Err(MissingDependency {
                        slot: slot.name.clone(),
                        agent: agent.clone(),
                        resolved: inputs.names(),
                    });
                }
            },
        };
        inputs.push(&slot.name, value);
    }
    Ok(inputs)
}
