//! I/O helpers: config, model calls, retrieval, prompts and the run archive.

pub mod archive;
pub mod config;
pub mod executor;
pub mod process;
pub mod prompt;
pub mod retrieval;
