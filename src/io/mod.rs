//! Side-effecting operations: HTTP gateway, configuration, state storage,
//! prompt templates, and child-process execution.

pub mod config;
pub mod gateway;
pub mod process;
pub mod prompt;
pub mod state_store;
