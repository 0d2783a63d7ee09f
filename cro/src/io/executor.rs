//! Language-model executor abstraction.
//!
//! The [`Executor`] trait decouples the decider and the content agents from the
//! actual model backend (currently `codex exec`). Tests use scripted executors
//! that return predetermined answers without spawning processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Parameters for one model call.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Short name used in logs and log file names (e.g. `03_match_scorer`).
    pub label: String,
    /// Prompt text fed to the model.
    pub prompt: String,
    /// JSON Schema the final answer must satisfy.
    pub output_schema: Value,
    /// Model override; the backend default applies when `None`.
    pub model: Option<String>,
    /// Maximum time to wait for the call to complete.
    pub timeout: Duration,
    /// Truncate captured process output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over model backends.
pub trait Executor {
    /// Run the model and return its final message text.
    fn exec(&self, request: &ExecRequest) -> Result<String>;
}

/// Executor that spawns `codex exec` in a scratch directory.
#[derive(Debug, Clone)]
pub struct CodexExecutor {
    program: String,
    log_dir: Option<PathBuf>,
}

impl CodexExecutor {
    pub fn new(program: &str, log_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.to_string(),
            log_dir,
        }
    }

    fn write_log(&self, label: &str, contents: &str) {
        let Some(dir) = &self.log_dir else {
            return;
        };
        let path = dir.join(format!("{label}.log"));
        let written = fs::create_dir_all(dir).and_then(|_| fs::write(&path, contents));
        if let Err(err) = written {
            warn!(path = %path.display(), err = %err, "failed to write executor log");
        }
    }
}

impl Executor for CodexExecutor {
    #[instrument(skip_all, fields(label = %request.label, timeout_secs = request.timeout.as_secs(), model = ?request.model))]
    fn exec(&self, request: &ExecRequest) -> Result<String> {
        info!("starting model call");

        let scratch = tempfile::tempdir().context("create executor scratch dir")?;
        let schema_path = scratch.path().join("output.schema.json");
        let output_path = scratch.path().join("output.json");
        let schema = serde_json::to_string_pretty(&request.output_schema)
            .context("serialize output schema")?;
        fs::write(&schema_path, schema)
            .with_context(|| format!("write schema {}", schema_path.display()))?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("exec")
            .arg("--sandbox")
            .arg("read-only")
            .arg("--skip-git-repo-check");
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("--output-schema")
            .arg(&schema_path)
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(scratch.path());

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {} exec", self.program))?;

        self.write_log(&request.label, &output.render_log("executor"));
        output.ensure_success(&format!("{} exec", self.program), request.timeout)?;

        let answer = fs::read_to_string(&output_path)
            .with_context(|| format!("missing executor output {}", output_path.display()))?;
        debug!(bytes = answer.len(), "model call completed");
        Ok(answer)
    }
}

/// Execute the model and load its answer as schema-valid JSON.
#[instrument(skip_all, fields(label = %request.label))]
pub fn execute_and_load_json<E: Executor + ?Sized>(
    executor: &E,
    request: &ExecRequest,
) -> Result<Value> {
    let answer = executor.exec(request)?;
    let value = parse_model_json(&answer)?;
    validate_against_schema(&request.output_schema, &value)?;
    Ok(value)
}

/// Parse model text as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_model_json(text: &str) -> Result<Value> {
    static OPEN_FENCE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^```[a-zA-Z]*\n?").expect("valid fence regex"));
    static CLOSE_FENCE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```$").expect("valid fence regex"));

    let trimmed = text.trim();
    let unfenced = OPEN_FENCE.replace(trimmed, "");
    let unfenced = CLOSE_FENCE.replace(&unfenced, "");
    serde_json::from_str(unfenced.trim()).context("parse model answer as json")
}

/// Validate JSON instance against a JSON Schema.
pub fn validate_against_schema(schema: &Value, instance: &Value) -> Result<()> {
    let compiled =
        jsonschema::validator_for(schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "model answer failed schema validation: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
