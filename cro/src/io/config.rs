//! Orchestrator configuration stored in `cro.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "cro.toml";

/// Orchestrator configuration (TOML).
///
/// Missing fields default to the values the pipeline was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CroConfig {
    /// Root directory for run archives.
    pub output_dir: PathBuf,

    /// Safety cap on loop iterations per run. A cap, not a target.
    pub max_steps: u32,

    /// Byte budget for content-agent prompts before droppable sections go.
    pub prompt_budget_bytes: usize,

    /// Keep each content agent's rendered prompt in its output under `prompt`.
    pub record_prompts: bool,

    pub llm: LlmConfig,
    pub decider: DeciderConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    /// Executable invoked for model calls (`<program> exec ...`).
    pub program: String,
    /// Default model; the executor's own default applies when unset.
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Write one executor log per call here when set.
    pub log_dir: Option<PathBuf>,
    /// Per-agent model overrides, keyed by agent name.
    pub agent_models: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeciderConfig {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Search command; the query is appended as the last argument.
    /// Empty disables retrieval.
    pub command: Vec<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            model: None,
            timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            log_dir: None,
            agent_models: BTreeMap::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            max_results: 5,
            timeout_secs: 60,
        }
    }
}

impl Default for CroConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("HH-exchanges"),
            max_steps: 24,
            prompt_budget_bytes: 40_000,
            record_prompts: false,
            llm: LlmConfig::default(),
            decider: DeciderConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl CroConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.llm.program.trim().is_empty() {
            return Err(anyhow!("llm.program must be non-empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.llm.output_limit_bytes == 0 {
            return Err(anyhow!("llm.output_limit_bytes must be > 0"));
        }
        if self
            .retrieval
            .command
            .first()
            .is_some_and(|program| program.trim().is_empty())
        {
            return Err(anyhow!("retrieval.command must start with a program"));
        }
        if self.retrieval.max_results == 0 {
            return Err(anyhow!("retrieval.max_results must be > 0"));
        }
        if self.retrieval.timeout_secs == 0 {
            return Err(anyhow!("retrieval.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Model for `agent`: per-agent override, then the default.
    pub fn model_for(&self, agent: &str) -> Option<String> {
        self.llm
            .agent_models
            .get(agent)
            .cloned()
            .or_else(|| self.llm.model.clone())
    }

    pub fn decider_model(&self) -> Option<String> {
        self.decider.model.clone().or_else(|| self.llm.model.clone())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CroConfig::default()`.
pub fn load_config(path: &Path) -> Result<CroConfig> {
    if !path.exists() {
        let cfg = CroConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CroConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CroConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
