//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod decision;
pub mod path;
pub mod registry;
pub mod resolve;
pub mod state;
pub mod types;
