//! The eight content agents of the sales-research pipeline.
//!
//! Every agent follows the same recipe: render its prompt from the resolved
//! inputs, optionally search the web first, call the model with the agent's
//! output schema and wrap the validated answer with the company it is about.
//! Errors are returned as-is; the invoker turns them into failure markers.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::core::registry::{Agent, AgentDescriptor, AgentInputs, AgentRegistry};
use crate::core::types::{InputSlot, RunParam};
use crate::io::config::CroConfig;
use crate::io::executor::{ExecRequest, Executor, execute_and_load_json};
use crate::io::prompt::{PromptBuilder, render_input};
use crate::io::retrieval::{Retriever, render_context};

use super::load_schema;

const TARGET: &str = "target_company";
const ORIGIN: &str = "origin_company";

/// Service handles and settings shared by every content agent.
pub struct AgentServices {
    pub executor: Rc<dyn Executor>,
    pub retriever: Rc<dyn Retriever>,
    pub prompt_budget_bytes: usize,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub max_results: usize,
    pub record_prompts: bool,
    /// Model per agent name; agents missing here use the executor default.
    pub models: BTreeMap<String, String>,
}

impl AgentServices {
    pub fn from_config(
        cfg: &CroConfig,
        executor: Rc<dyn Executor>,
        retriever: Rc<dyn Retriever>,
    ) -> Self {
        Self {
            executor,
            retriever,
            prompt_budget_bytes: cfg.prompt_budget_bytes,
            timeout: Duration::from_secs(cfg.llm.timeout_secs),
            output_limit_bytes: cfg.llm.output_limit_bytes,
            max_results: cfg.retrieval.max_results,
            record_prompts: cfg.record_prompts,
            models: profiles()
                .iter()
                .filter_map(|p| Some((p.name.to_string(), cfg.model_for(p.name)?)))
                .collect(),
        }
    }
}

/// Which company an artifact is about; decides the identifying key of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subject {
    Target,
    Origin,
    Pair,
}

/// Web search performed before the model call.
#[derive(Debug, Clone, Copy)]
struct Research {
    /// Input slot holding the company to search for.
    slot: &'static str,
    query: fn(&str) -> String,
    /// Context text used when the search finds nothing.
    empty_notice: &'static str,
}

/// Static description of one catalog agent.
#[derive(Debug, Clone)]
struct AgentProfile {
    name: &'static str,
    schema: &'static str,
    payload_key: &'static str,
    subject: Subject,
    research: Option<Research>,
    /// `(output key, input slot)`: copy the input's `retrieval_sources` into the output.
    carried_sources: &'static [(&'static str, &'static str)],
    inputs: Vec<InputSlot>,
}

fn pain_query(company: &str) -> String {
    format!(
        "{company} pain points OR challenges OR customer complaints \
         site:reddit.com OR site:glassdoor.com OR site:medium.com OR site:trustpilot.com"
    )
}

fn value_query(company: &str) -> String {
    format!(
        "{company} value proposition OR product offering OR competitive advantage \
         site:{company} OR site:linkedin.com OR site:medium.com OR site:techcrunch.com"
    )
}

fn target() -> InputSlot {
    InputSlot::run_param(TARGET, RunParam::TargetCompany)
}

fn origin() -> InputSlot {
    InputSlot::run_param(ORIGIN, RunParam::OriginCompany)
}

fn output_of(slot: &str, agent: &str) -> InputSlot {
    InputSlot::agent_output(slot, agent)
}

/// Catalog in dependency order.
fn profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile {
            name: "pain_point_detective",
            schema: include_str!("../../schemas/agents/pain_point_detective.schema.json"),
            payload_key: "pain_points",
            subject: Subject::Target,
            research: Some(Research {
                slot: TARGET,
                query: pain_query,
                empty_notice: "No relevant online sources found.",
            }),
            carried_sources: &[],
            inputs: vec![target()],
        },
        AgentProfile {
            name: "value_prop_engineer",
            schema: include_str!("../../schemas/agents/value_prop_engineer.schema.json"),
            payload_key: "value_proposition",
            subject: Subject::Origin,
            research: Some(Research {
                slot: ORIGIN,
                query: value_query,
                empty_notice: "No relevant origin_company information found online.",
            }),
            carried_sources: &[],
            inputs: vec![origin()],
        },
        AgentProfile {
            name: "match_scorer",
            schema: include_str!("../../schemas/agents/match_scorer.schema.json"),
            payload_key: "matching_result",
            subject: Subject::Pair,
            research: None,
            carried_sources: &[("pain_sources", "pain_json"), ("value_sources", "value_json")],
            inputs: vec![
                target(),
                origin(),
                output_of("pain_json", "pain_point_detective"),
                output_of("value_json", "value_prop_engineer"),
            ],
        },
        AgentProfile {
            name: "selling_argumentation_builder",
            schema: include_str!("../../schemas/agents/selling_argumentation_builder.schema.json"),
            payload_key: "selling_argumentation",
            subject: Subject::Target,
            research: None,
            carried_sources: &[],
            inputs: vec![
                target(),
                output_of("pain_json", "pain_point_detective"),
                output_of("value_json", "value_prop_engineer"),
                output_of("match_json", "match_scorer"),
            ],
        },
        AgentProfile {
            name: "outreach_email_builder",
            schema: include_str!("../../schemas/agents/outreach_email_builder.schema.json"),
            payload_key: "outreach_email",
            subject: Subject::Target,
            research: None,
            carried_sources: &[],
            inputs: vec![
                target(),
                output_of("pain_json", "pain_point_detective"),
                output_of("value_json", "value_prop_engineer"),
                output_of("match_json", "match_scorer"),
                output_of("sell_json", "selling_argumentation_builder"),
            ],
        },
        AgentProfile {
            name: "offer_note_builder",
            schema: include_str!("../../schemas/agents/offer_note_builder.schema.json"),
            payload_key: "offer_note",
            subject: Subject::Target,
            research: None,
            carried_sources: &[],
            inputs: vec![
                target(),
                output_of("pain_json", "pain_point_detective"),
                output_of("value_json", "value_prop_engineer"),
                output_of("match_json", "match_scorer"),
                output_of("sell_json", "selling_argumentation_builder"),
                output_of("email_json", "outreach_email_builder"),
            ],
        },
        AgentProfile {
            name: "summarizer_agent",
            schema: include_str!("../../schemas/agents/summarizer_agent.schema.json"),
            payload_key: "summary",
            subject: Subject::Pair,
            research: None,
            carried_sources: &[],
            inputs: vec![
                target(),
                origin(),
                output_of("match_json", "match_scorer"),
                output_of("sell_json", "selling_argumentation_builder"),
                output_of("email_json", "outreach_email_builder"),
            ],
        },
        AgentProfile {
            name: "meta_reasoner",
            schema: include_str!("../../schemas/agents/meta_reasoner.schema.json"),
            payload_key: "meta_reasoning",
            subject: Subject::Pair,
            research: None,
            carried_sources: &[],
            inputs: vec![
                target(),
                origin(),
                output_of("pain_json", "pain_point_detective"),
                output_of("value_json", "value_prop_engineer"),
                output_of("match_json", "match_scorer"),
                output_of("sell_json", "selling_argumentation_builder"),
                output_of("email_json", "outreach_email_builder"),
                output_of("offer_json", "offer_note_builder"),
            ],
        },
    ]
}

/// A catalog agent bound to its services.
struct PromptAgent {
    profile: AgentProfile,
    services: Rc<AgentServices>,
}

impl PromptAgent {
    fn research(
        &self,
        research: &Research,
        inputs: &AgentInputs,
    ) -> Result<(String, Vec<String>)> {
        let company = inputs.get_str(research.slot)?;
        let query = (research.query)(company);
        let hits = self
            .services
            .retriever
            .search(&query, self.services.max_results)
            .with_context(|| format!("search for {company}"))?;
        debug!(hits = hits.len(), "retrieval context ready");
        let sources = hits.iter().map(|hit| hit.url.clone()).collect();
        Ok((render_context(&hits, research.empty_notice), sources))
    }

    fn subject_value(&self, inputs: &AgentInputs) -> Result<(&'static str, String)> {
        Ok(match self.profile.subject {
            Subject::Target => ("company", inputs.get_str(TARGET)?.to_string()),
            Subject::Origin => ("origin_company", inputs.get_str(ORIGIN)?.to_string()),
            Subject::Pair => (
                "company_pair",
                format!("{} -> {}", inputs.get_str(TARGET)?, inputs.get_str(ORIGIN)?),
            ),
        })
    }
}

impl Agent for PromptAgent {
    #[instrument(skip_all, fields(agent = self.profile.name))]
    fn run(&self, inputs: &AgentInputs) -> Result<Value> {
        let profile = &self.profile;
        let mut vars = BTreeMap::new();
        vars.insert(
            "today".to_string(),
            chrono::Local::now().format("%Y-%m-%d").to_string(),
        );
        for (name, value) in inputs.iter() {
            vars.insert(name.to_string(), render_input(value)?);
        }

        let mut retrieval_sources = None;
        if let Some(research) = &profile.research {
            let (context, sources) = self.research(research, inputs)?;
            vars.insert("retrieval".to_string(), context);
            retrieval_sources = Some(sources);
        }

        let rendered = PromptBuilder::new(self.services.prompt_budget_bytes)
            .build_agent(profile.name, &vars)?
            .render();
        let request = ExecRequest {
            label: format!("{:02}_{}", inputs.step(), profile.name),
            prompt: rendered,
            output_schema: load_schema(profile.name, profile.schema)?,
            model: self.services.models.get(profile.name).cloned(),
            timeout: self.services.timeout,
            output_limit_bytes: self.services.output_limit_bytes,
        };
        let payload = execute_and_load_json(self.services.executor.as_ref(), &request)
            .with_context(|| format!("{} model call", profile.name))?;

        let (subject_key, subject) = self.subject_value(inputs)?;
        let mut output = Map::new();
        output.insert(subject_key.to_string(), Value::String(subject));
        output.insert(profile.payload_key.to_string(), payload);
        if let Some(sources) = retrieval_sources {
            output.insert("retrieval_sources".to_string(), json!(sources));
        }
        for (key, slot) in profile.carried_sources {
            let carried = inputs
                .get(slot)
                .and_then(|value| value.get("retrieval_sources"))
                .cloned()
                .unwrap_or_else(|| json!([]));
            output.insert((*key).to_string(), carried);
        }
        if self.services.record_prompts {
            output.insert("prompt".to_string(), Value::String(request.prompt));
        }
        Ok(Value::Object(output))
    }
}

/// Build the registry of all content agents, in dependency order.
pub fn cro_registry(services: AgentServices) -> Result<AgentRegistry> {
    let services = Rc::new(services);
    let mut registry = AgentRegistry::new();
    for profile in profiles() {
        let name = profile.name;
        let inputs = profile.inputs.clone();
        let agent = PromptAgent {
            profile,
            services: Rc::clone(&services),
        };
        registry
            .register(AgentDescriptor::new(name, agent, inputs))
            .map_err(|err| anyhow!("register {name}: {err}"))?;
    }
    Ok(registry)
}
