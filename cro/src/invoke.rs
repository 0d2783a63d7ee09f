//! Agent invocation with failure containment.
//!
//! Nothing an agent does escapes this boundary: missing inputs, returned
//! errors and panics all become [`AgentOutcome::Failure`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, instrument, warn};

use crate::core::registry::AgentDescriptor;
use crate::core::resolve::resolve_inputs;
use crate::core::state::RunState;
use crate::core::types::{AgentFailure, AgentOutcome};

/// Result of one invocation: the slots that resolved and the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub inputs: Vec<String>,
    pub outcome: AgentOutcome,
}

/// Resolve `descriptor`'s inputs against `state` and run it.
///
/// The agent is never called when a dependency is missing. On success the
/// returned value is passed through untouched.
#[instrument(skip_all, fields(agent = %descriptor.name))]
pub fn invoke(descriptor: &AgentDescriptor, state: &RunState) -> Invocation {
    let inputs = match resolve_inputs(descriptor, state) {
        Ok(inputs) => inputs,
        Err(missing) => {
            warn!(slot = %missing.slot, dependency = %missing.agent, "missing dependency");
            return Invocation {
                inputs: missing.resolved.clone(),
                outcome: AgentOutcome::Failure(missing.into()),
            };
        }
    };
    let names = inputs.names();
    debug!(inputs = ?names, "inputs resolved");

    let outcome = match catch_unwind(AssertUnwindSafe(|| descriptor.agent.run(&inputs))) {
        Ok(Ok(output)) => AgentOutcome::Success(output),
        Ok(Err(err)) => {
            warn!(err = %format!("{err:#}"), "agent failed");
            AgentOutcome::Failure(AgentFailure::Execution {
                message: format!("{err:#}"),
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(panic = %message, "agent panicked");
            AgentOutcome::Failure(AgentFailure::Execution {
                message: format!("panicked: {message}"),
            })
        }
    };
    Invocation {
        inputs: names,
        outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
