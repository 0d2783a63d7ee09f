//! Run archive under `<output_dir>/<target>__<origin>/`.
//!
//! One JSON file per executed step plus a summary written when the run ends.
//! Every file is pretty-printed with a trailing newline and replaced atomically,
//! so writing the same value twice leaves byte-identical files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::path::{pair_folder_name, step_file_name};
use crate::core::types::{LoopStop, StepRecord};

pub const SUMMARY_FILE_NAME: &str = "00_summary_hierarchical.json";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

static STEP_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2,}_.+\.json(\.tmp)?$").expect("valid step file regex"));

/// Final record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// `"<target> -> <origin>"`.
    pub pair: String,
    pub timestamp: String,
    pub stop: LoopStop,
    pub run_counts: BTreeMap<String, u32>,
    pub steps: Vec<StepRecord>,
    pub final_outputs: BTreeMap<String, Value>,
}

impl RunSummary {
    /// Build a summary stamped with the current local time.
    pub fn new(
        target_company: &str,
        origin_company: &str,
        stop: LoopStop,
        run_counts: BTreeMap<String, u32>,
        steps: Vec<StepRecord>,
        final_outputs: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            pair: format!("{target_company} -> {origin_company}"),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            stop,
            run_counts,
            steps,
            final_outputs,
        }
    }
}

/// Folder holding the files of one `(target, origin)` run.
#[derive(Debug, Clone)]
pub struct RunArchive {
    dir: PathBuf,
}

impl RunArchive {
    /// Create the pair folder below `output_dir`, or reuse it after removing
    /// the step files and summary of an earlier run.
    pub fn create(output_dir: &Path, target_company: &str, origin_company: &str) -> Result<Self> {
        let dir = output_dir.join(pair_folder_name(target_company, origin_company));
        fs::create_dir_all(&dir)
            .with_context(|| format!("create archive dir {}", dir.display()))?;
        clear_run_files(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn step_path(&self, step: u32, agent: &str) -> PathBuf {
        self.dir.join(step_file_name(step, agent))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE_NAME)
    }

    /// Persist the output (or failure marker) of one step.
    pub fn write_step(&self, step: u32, agent: &str, output: &Value) -> Result<PathBuf> {
        let path = self.step_path(step, agent);
        write_json(&path, output)?;
        debug!(path = %path.display(), "wrote step file");
        Ok(path)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.summary_path();
        write_json(&path, summary)?;
        debug!(path = %path.display(), "wrote run summary");
        Ok(path)
    }
}

/// Load a summary written by [`RunArchive::write_summary`].
pub fn read_summary(path: &Path) -> Result<RunSummary> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Remove regular files named like step files, summary included. Other files
/// and any directories are left alone.
fn clear_run_files(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let name = entry.file_name();
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if is_file && name.to_str().is_some_and(|n| STEP_FILE_RE.is_match(n)) {
            let path = entry.path();
            fs::remove_file(&path).with_context(|| format!("remove stale {}", path.display()))?;
            debug!(path = %path.display(), "removed file of an earlier run");
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize archive json")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            warn!(path = %tmp_path.display(), err = %cleanup, "failed to remove temp file");
        }
        return Err(err).with_context(|| format!("replace {}", path.display()));
    }
    Ok(())
}
