//! Hierarchical sales-research orchestrator.
//!
//! A decider repeatedly picks the next agent to run for a `(target, origin)`
//! company pair until it stops, names an unknown agent, or a step cap is hit.
//! Each step resolves the agent's declared inputs, invokes it with failures
//! contained, records the result and persists it under the run archive.
//!
//! - **[`core`]**: Pure logic (registry, input resolution, run state, decisions).
//! - **[`io`]**: Side effects (config, model and search processes, prompts, archive).
//! - **[`agents`]**: The model-backed decider and content agents.
//!
//! [`invoke`] and [`orchestrate`] tie these together into a run.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod invoke;
pub mod io;
pub mod logging;
pub mod orchestrate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
