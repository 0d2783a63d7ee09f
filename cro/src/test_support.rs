//! Test-only doubles for the decider, executor, retriever and agents.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::agents::decider::Decider;
use crate::core::decision::Decision;
use crate::core::registry::{Agent, AgentDescriptor, AgentInputs, AgentRegistry};
use crate::core::state::StateSnapshot;
use crate::core::types::{InputSlot, RunParam};
use crate::io::executor::{ExecRequest, Executor};
use crate::io::retrieval::{Retriever, SearchHit};

/// Decider that replays a fixed script, then stops.
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    script: RefCell<VecDeque<Decision>>,
    seen: RefCell<Vec<Value>>,
}

impl ScriptedDecider {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            script: RefCell::new(decisions.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Shorthand: run each named agent in turn (`"STOP"` stops).
    pub fn agents(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| Decision::run(name, format!("scripted {name}")))
                .collect(),
        )
    }

    /// Snapshots received so far, serialized as sent across the decider boundary.
    pub fn snapshots(&self) -> Vec<Value> {
        self.seen.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }
}

impl Decider for ScriptedDecider {
    fn decide(&self, snapshot: &StateSnapshot<'_>) -> Decision {
        let serialized = serde_json::to_value(snapshot).unwrap_or(Value::Null);
        self.seen.borrow_mut().push(serialized);
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Decision::stop("script exhausted"))
    }
}

/// Decider that always picks the same agent.
#[derive(Debug, Clone)]
pub struct RepeatDecider {
    pub agent: String,
}

impl Decider for RepeatDecider {
    fn decide(&self, _snapshot: &StateSnapshot<'_>) -> Decision {
        Decision::run(&self.agent, "again")
    }
}

/// Executor that returns scripted answers in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    answers: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(answers: Vec<Result<String, String>>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Every answer succeeds with the given JSON values, in order.
    pub fn json(answers: Vec<Value>) -> Self {
        Self::new(answers.into_iter().map(|v| Ok(v.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.borrow().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.answers.borrow_mut().pop_front() {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted answer for {}", request.label)),
        }
    }
}

/// Retriever returning the same hits for every query.
#[derive(Debug, Default)]
pub struct FixedRetriever {
    hits: Vec<SearchHit>,
    queries: RefCell<Vec<String>>,
}

impl FixedRetriever {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }
}

impl Retriever for FixedRetriever {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.borrow_mut().push(query.to_string());
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// Create a deterministic search hit.
pub fn hit(title: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        url: url.to_string(),
        content: format!("{title} content"),
    }
}

/// Agent returning `{"agent": name, "inputs": [...]}` and counting its calls.
pub fn echo_agent(name: &str, calls: Rc<RefCell<u32>>) -> impl Agent + 'static {
    let name = name.to_string();
    move |inputs: &AgentInputs| -> Result<Value> {
        *calls.borrow_mut() += 1;
        Ok(json!({"agent": name, "inputs": inputs.names()}))
    }
}

/// Agent that always fails with `message`.
pub fn failing_agent(message: &str) -> impl Agent + 'static {
    let message = message.to_string();
    move |_: &AgentInputs| -> Result<Value> { Err(anyhow!("{message}")) }
}

/// Agent that panics with `message`.
pub fn panicking_agent(message: &str) -> impl Agent + 'static {
    let message = message.to_string();
    move |_: &AgentInputs| -> Result<Value> { panic!("{message}") }
}

/// Registry `{A: [target_company]}`.
pub fn registry_a() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry
        .register(AgentDescriptor::new(
            "A",
            echo_agent("A", Rc::default()),
            vec![InputSlot::run_param("target_company", RunParam::TargetCompany)],
        ))
        .expect("register A");
    registry
}

/// Registry `{A: [target_company], B: [A]}`.
pub fn registry_a_b() -> AgentRegistry {
    let mut registry = registry_a();
    registry
        .register(AgentDescriptor::new(
            "B",
            echo_agent("B", Rc::default()),
            vec![InputSlot::agent_output("a_json", "A")],
        ))
        .expect("register B");
    registry
}
