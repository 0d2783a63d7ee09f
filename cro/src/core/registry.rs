//! Agent catalog: names, callables and declared input sources.
//!
//! Registration order doubles as a topological order: an `AgentOutput`
//! source may only name an agent registered earlier, so cycles cannot be
//! constructed.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, anyhow, bail};
use serde_json::Value;

use super::types::{InputSlot, InputSource};

/// A unit of work producing one artifact from named inputs.
pub trait Agent {
    fn run(&self, inputs: &AgentInputs) -> Result<Value>;
}

impl<F> Agent for F
where
    F: Fn(&AgentInputs) -> Result<Value>,
{
    fn run(&self, inputs: &AgentInputs) -> Result<Value> {
        self(inputs)
    }
}

/// Resolved arguments, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentInputs {
    step: u32,
    values: Vec<(String, Value)>,
}

impl AgentInputs {
    /// Empty inputs for the call made at `step` (1-based).
    pub fn at_step(step: u32) -> Self {
        Self {
            step,
            values: Vec::new(),
        }
    }

    /// Step this call belongs to; 0 outside a run.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn push(&mut self, name: &str, value: Value) {
        self.values.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, value)| value)
    }

    /// Fetch a string-valued input (run parameters are strings).
    pub fn get_str(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| anyhow!("missing input '{name}'"))?
            .as_str()
            .ok_or_else(|| anyhow!("input '{name}' is not a string"))
    }

    pub fn names(&self) -> Vec<String> {
        self.values.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Registry entry for one invocable agent.
pub struct AgentDescriptor {
    pub name: String,
    pub agent: Box<dyn Agent>,
    pub inputs: Vec<InputSlot>,
}

impl AgentDescriptor {
    pub fn new(name: &str, agent: impl Agent + 'static, inputs: Vec<InputSlot>) -> Self {
        Self {
            name: name.to_string(),
            agent: Box::new(agent),
            inputs,
        }
    }

    /// Names of agents whose outputs this agent consumes.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(|slot| match &slot.source {
            InputSource::AgentOutput(agent) => Some(agent.as_str()),
            InputSource::RunParam(_) => None,
        })
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Lookup of a name that is not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAgentError {
    pub name: String,
}

impl fmt::Display for UnknownAgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown agent '{}'", self.name)
    }
}

impl std::error::Error for UnknownAgentError {}

/// Read-only after construction; one registry serves every run in the process.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, rejecting duplicates and forward or self references.
    pub fn register(&mut self, descriptor: AgentDescriptor) -> Result<()> {
        if self.contains(&descriptor.name) {
            bail!("agent '{}' is already registered", descriptor.name);
        }

        let mut slots = HashSet::new();
        for slot in &descriptor.inputs {
            if !slots.insert(slot.name.as_str()) {
                bail!(
                    "agent '{}' declares input '{}' twice",
                    descriptor.name,
                    slot.name
                );
            }
        }

        for dep in descriptor.dependencies() {
            if dep == descriptor.name {
                bail!("agent '{}' depends on its own output", descriptor.name);
            }
            if !self.contains(dep) {
                bail!(
                    "agent '{}' depends on '{}', which must be registered first",
                    descriptor.name,
                    dep
                );
            }
        }

        self.agents.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&AgentDescriptor, UnknownAgentError> {
        self.agents
            .iter()
            .find(|descriptor| descriptor.name == name)
            .ok_or_else(|| UnknownAgentError {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.iter().any(|descriptor| descriptor.name == name)
    }

    /// All names, in registration order.
    pub fn list_names(&self) -> Vec<String> {
        self.agents
            .iter()
            .map(|descriptor| descriptor.name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RunParam;
    use serde_json::json;

    fn echo(inputs: &AgentInputs) -> Result<Value> {
        Ok(json!({ "inputs": inputs.names() }))
    }

    fn registry_ab() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry
            .register(AgentDescriptor::new(
                "a",
                echo,
                vec![InputSlot::run_param("target_company", RunParam::TargetCompany)],
            ))
            .expect("register a");
        registry
            .register(AgentDescriptor::new(
                "b",
                echo,
                vec![InputSlot::agent_output("a_json", "a")],
            ))
            .expect("register b");
        registry
    }

    #[test]
    fn list_names_keeps_registration_order() {
        assert_eq!(registry_ab().list_names(), vec!["a", "b"]);
    }

    #[test]
    fn get_unknown_is_an_error() {
        let registry = registry_ab();
        let err = registry.get("zzz").unwrap_err();
        assert_eq!(err.name, "zzz");
        assert_eq!(err.to_string(), "unknown agent 'zzz'");
        assert_eq!(registry.get("b").expect("b").name, "b");
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = registry_ab();
        let err = registry
            .register(AgentDescriptor::new("a", echo, Vec::new()))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn rejects_forward_and_self_references() {
        let mut registry = AgentRegistry::new();
        let err = registry
            .register(AgentDescriptor::new(
                "b",
                echo,
                vec![InputSlot::agent_output("a_json", "a")],
            ))
            .unwrap_err();
        assert!(err.to_string().contains("must be registered first"));

        let err = registry
            .register(AgentDescriptor::new(
                "c",
                echo,
                vec![InputSlot::agent_output("c_json", "c")],
            ))
            .unwrap_err();
        assert!(err.to_string().contains("its own output"));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_duplicate_slot_names() {
        let mut registry = AgentRegistry::new();
        let err = registry
            .register(AgentDescriptor::new(
                "a",
                echo,
                vec![
                    InputSlot::run_param("company", RunParam::TargetCompany),
                    InputSlot::run_param("company", RunParam::OriginCompany),
                ],
            ))
            .unwrap_err();
        assert!(err.to_string().contains("declares input 'company' twice"));
    }

    #[test]
    fn dependencies_skip_run_params() {
        let registry = registry_ab();
        let deps: Vec<&str> = registry.get("b").expect("b").dependencies().collect();
        assert_eq!(deps, vec!["a"]);
        assert_eq!(registry.get("a").expect("a").dependencies().count(), 0);
    }
}
