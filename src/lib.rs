//! LLM-driven project generation pipeline.
//!
//! A user request is structured into a development brief, recursively
//! decomposed into a task tree, materialized as generated source files, then
//! executed and repaired until it runs. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task model, tolerant parsing,
//!   path policy, state snapshots). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP gateway, filesystem,
//!   process execution). Isolated to enable scripted doubles in tests.
//!
//! Orchestration modules ([`pipeline`], [`builder`], [`repair`]) plus the
//! model-facing [`agents`] coordinate core logic with I/O to implement the
//! CLI commands.

pub mod agents;
pub mod builder;
pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
