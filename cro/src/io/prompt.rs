//! Prompt rendering for the decider and the content agents.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::decision::STOP_SENTINEL;
use crate::core::state::StateSnapshot;

const DECIDER_TEMPLATE: &str = include_str!("prompts/decider.md");

/// Agent prompt templates, keyed by agent name.
const AGENT_TEMPLATES: [(&str, &str); 8] = [
    (
        "pain_point_detective",
        include_str!("prompts/pain_point_detective.md"),
    ),
    (
        "value_prop_engineer",
        include_str!("prompts/value_prop_engineer.md"),
    ),
    ("match_scorer", include_str!("prompts/match_scorer.md")),
    (
        "selling_argumentation_builder",
        include_str!("prompts/selling_argumentation_builder.md"),
    ),
    (
        "outreach_email_builder",
        include_str!("prompts/outreach_email_builder.md"),
    ),
    (
        "offer_note_builder",
        include_str!("prompts/offer_note_builder.md"),
    ),
    ("summarizer_agent", include_str!("prompts/summarizer_agent.md")),
    ("meta_reasoner", include_str!("prompts/meta_reasoner.md")),
];

/// Sections removed first when an agent prompt is over budget.
const AGENT_DROP_ORDER: [&str; 1] = ["retrieval"];

const TRUNCATION_MARKER: &str = "\n[truncated]";

static TEMPLATES: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("decider", DECIDER_TEMPLATE)
        .expect("decider template should be valid");
    for (name, source) in AGENT_TEMPLATES {
        env.add_template(name, source)
            .expect("agent template should be valid");
    }
    env
});

/// One `<!-- section:KEY required|droppable -->` block of a rendered template.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    key: String,
    droppable: bool,
    body: String,
}

/// Split rendered output at section markers. Text before the first marker is
/// discarded, as are droppable sections that rendered empty.
fn split_sections(rendered: &str) -> Vec<Section> {
    static MARKER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("valid section regex")
    });

    let mut sections: Vec<Section> = Vec::new();
    let mut open: Option<(String, bool, usize)> = None;
    let mut close = |open: Option<(String, bool, usize)>, end: usize| {
        if let Some((key, droppable, start)) = open {
            let body = rendered[start..end].trim().to_string();
            if !(droppable && body.is_empty()) {
                sections.push(Section {
                    key,
                    droppable,
                    body,
                });
            }
        }
    };
    for caps in MARKER.captures_iter(rendered) {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        close(open.take(), whole.start());
        open = Some((key.as_str().to_string(), kind.as_str() == "droppable", whole.end()));
    }
    close(open, rendered.len());
    sections
}

fn total_bytes(sections: &[Section]) -> usize {
    sections.iter().map(|s| s.body.len()).sum()
}

/// Shrink `sections` to `budget` bytes of body text.
///
/// Droppable sections go first, in `drop_order`. If that is not enough the
/// last section is cut and ends with a truncation marker.
fn fit_to_budget(sections: &mut Vec<Section>, budget: usize, drop_order: &[&str]) {
    for key in drop_order {
        if total_bytes(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.droppable && s.key == *key) {
            let removed = sections.remove(idx);
            debug!(section = %removed.key, bytes = removed.body.len(), "dropped prompt section");
        }
    }

    let total = total_bytes(sections);
    if total <= budget {
        return;
    }
    let Some(last) = sections.last_mut() else {
        return;
    };
    let keep = last.body.len().saturating_sub(total - budget);
    let before = last.body.len();
    if keep > TRUNCATION_MARKER.len() {
        truncate_at_char_boundary(&mut last.body, keep - TRUNCATION_MARKER.len());
        last.body.push_str(TRUNCATION_MARKER);
    } else {
        truncate_at_char_boundary(&mut last.body, keep);
    }
    debug!(section = %last.key, before, after = last.body.len(), "truncated prompt section");
}

fn truncate_at_char_boundary(text: &mut String, max_len: usize) {
    let mut cut = max_len.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn join_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize prompt json")
}

/// Render a resolved input for a prompt: strings verbatim, anything else as pretty JSON.
pub fn render_input(value: &Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => pretty_json(other),
    }
}

/// Renders the decider and agent prompts; agent prompts are held to a byte budget.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// The decider prompt is never trimmed: the decider must see the whole snapshot.
    pub fn build_decider(&self, snapshot: &StateSnapshot<'_>) -> Result<PromptPack> {
        let rendered = TEMPLATES.get_template("decider")?.render(context! {
            target_company => snapshot.target_company,
            origin_company => snapshot.origin_company,
            run_counts => pretty_json(snapshot.run_counts)?,
            history => pretty_json(&snapshot.history)?,
            available_agents => snapshot.available_agents,
            stop => STOP_SENTINEL,
        })?;
        Ok(PromptPack {
            content: join_sections(&split_sections(&rendered)),
        })
    }

    /// Render `agent`'s template with `vars` (slot names, `today`, `retrieval`).
    pub fn build_agent(&self, agent: &str, vars: &BTreeMap<String, String>) -> Result<PromptPack> {
        let template = TEMPLATES
            .get_template(agent)
            .map_err(|_| anyhow!("no prompt template for agent '{agent}'"))?;
        let rendered = template.render(vars)?;
        let mut sections = split_sections(&rendered);
        fit_to_budget(&mut sections, self.budget_bytes, &AGENT_DROP_ORDER);
        Ok(PromptPack {
            content: join_sections(&sections),
        })
    }
}

/// Final prompt text.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn render(&self) -> String {
        self.content.clone()
    }
}
