//! Web-search retrieval used by the research agents.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::process::run_command_with_timeout;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Abstraction over search backends.
pub trait Retriever {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Retrieval disabled: every search returns no hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetriever;

impl Retriever for NoRetriever {
    fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// Runs a configured search command with the query as its last argument.
///
/// The command receives `CRO_MAX_RESULTS` in its environment and must print
/// either a JSON array of hits or an object with a `results` array.
#[derive(Debug, Clone)]
pub struct CommandRetriever {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Hits(Vec<SearchHit>),
    Wrapped { results: Vec<SearchHit> },
}

impl CommandRetriever {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Retriever for CommandRetriever {
    #[instrument(skip_all, fields(max_results))]
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let (program, args) = self
            .command
            .split_first()
            .context("retrieval command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(query)
            .env("CRO_MAX_RESULTS", max_results.to_string());

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .context("run retrieval command")?;
        output.ensure_success("retrieval command", self.timeout)?;

        let hits = parse_search_output(&output.stdout, max_results)?;
        debug!(hits = hits.len(), "retrieval completed");
        Ok(hits)
    }
}

fn parse_search_output(stdout: &[u8], max_results: usize) -> Result<Vec<SearchHit>> {
    let response: SearchResponse =
        serde_json::from_slice(stdout).context("parse retrieval output as json")?;
    let mut hits = match response {
        SearchResponse::Hits(hits) => hits,
        SearchResponse::Wrapped { results } => results,
    };
    hits.truncate(max_results);
    Ok(hits)
}

/// Render hits as prompt context, or `empty_notice` when there are none.
pub fn render_context(hits: &[SearchHit], empty_notice: &str) -> String {
    if hits.is_empty() {
        return empty_notice.to_string();
    }
    hits.iter()
        .map(|hit| format!("- {}\n{}", hit.title, hit.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
