//! Language-model backed components: the next-step decider and the content agents.

use anyhow::{Context, Result};
use serde_json::Value;

pub mod catalog;
pub mod decider;

pub(crate) fn load_schema(name: &str, contents: &str) -> Result<Value> {
    serde_json::from_str(contents).with_context(|| format!("parse {name} schema"))
}
