//! Decider answers: parsing untrusted JSON and classifying it against the registry.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{AgentDescriptor, AgentRegistry};

/// Literal agent value that ends a run.
pub const STOP_SENTINEL: &str = "STOP";

/// Next-step choice. `reason` is advisory and never drives control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub agent: String,
    pub reason: String,
}

impl Decision {
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            agent: STOP_SENTINEL.to_string(),
            reason: reason.into(),
        }
    }

    pub fn run(agent: &str, reason: impl Into<String>) -> Self {
        Self {
            agent: agent.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.agent == STOP_SENTINEL
    }
}

/// Parse a decider answer, trusting nothing but `agent: string` and `reason: string`.
pub fn parse_decision(value: &Value) -> Result<Decision> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("decision must be a JSON object"))?;
    let agent = object
        .get("agent")
        .ok_or_else(|| anyhow!("decision is missing 'agent'"))?
        .as_str()
        .ok_or_else(|| anyhow!("decision 'agent' must be a string"))?;
    let reason = object
        .get("reason")
        .ok_or_else(|| anyhow!("decision is missing 'reason'"))?
        .as_str()
        .ok_or_else(|| anyhow!("decision 'reason' must be a string"))?;
    Ok(Decision::run(agent, reason))
}

/// What the loop should do with a decision.
#[derive(Debug)]
pub enum NextStep<'a> {
    Stop,
    Run(&'a AgentDescriptor),
    Unknown,
}

/// Membership-check the decider's choice; never index the registry with it blindly.
pub fn classify<'a>(decision: &Decision, registry: &'a AgentRegistry) -> NextStep<'a> {
    if decision.is_stop() {
        return NextStep::Stop;
    }
    match registry.get(&decision.agent) {
        Ok(descriptor) => NextStep::Run(descriptor),
        Err(_) => NextStep::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{AgentDescriptor, AgentInputs};
    use serde_json::json;

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(AgentDescriptor::new(
                "a",
                |_: &AgentInputs| -> Result<Value> { Ok(Value::Null) },
                Vec::new(),
            ))
            .expect("register");
        registry
    }

    #[test]
    fn parses_well_formed_decision() {
        let decision =
            parse_decision(&json!({"agent": "a", "reason": "first", "extra": 1})).expect("parse");
        assert_eq!(decision, Decision::run("a", "first"));
    }

    #[test]
    fn rejects_non_string_fields() {
        let err = parse_decision(&json!({"agent": 3, "reason": "r"})).unwrap_err();
        assert!(err.to_string().contains("'agent' must be a string"));
        let err = parse_decision(&json!({"agent": "a", "reason": ["r"]})).unwrap_err();
        assert!(err.to_string().contains("'reason' must be a string"));
        let err = parse_decision(&json!({"agent": "a"})).unwrap_err();
        assert!(err.to_string().contains("missing 'reason'"));
        let err = parse_decision(&json!("STOP")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn classify_checks_membership() {
        let registry = registry();
        assert!(matches!(
            classify(&Decision::stop("done"), &registry),
            NextStep::Stop
        ));
        assert!(matches!(
            classify(&Decision::run("a", ""), &registry),
            NextStep::Run(descriptor) if descriptor.name == "a"
        ));
        assert!(matches!(
            classify(&Decision::run("ZZZ", ""), &registry),
            NextStep::Unknown
        ));
        assert!(matches!(
            classify(&Decision::run("stop", ""), &registry),
            NextStep::Unknown
        ));
    }
}
