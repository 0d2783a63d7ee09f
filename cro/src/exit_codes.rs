//! Stable exit codes for `cro` commands.

use crate::core::types::LoopStop;

/// Command succeeded; for `cro run`, the decider stopped the run.
pub const OK: i32 = 0;
/// Invalid arguments or config, or an error outside the loop.
pub const INVALID: i32 = 1;
/// `cro run` hit `max_steps` without a stop decision.
pub const STEP_LIMIT: i32 = 2;
/// `cro run` stopped because the decider named an unknown agent.
pub const INVALID_AGENT: i32 = 3;

/// Exit code for a finished run.
pub fn for_stop(stop: &LoopStop) -> i32 {
    match stop {
        LoopStop::StoppedByDecision { .. } => OK,
        LoopStop::StoppedStepLimit { .. } => STEP_LIMIT,
        LoopStop::StoppedInvalidAgent { .. } => INVALID_AGENT,
    }
}
