//! Pure, deterministic logic for the generation pipeline.
//!
//! Nothing in here performs I/O or talks to the model endpoint; everything is
//! testable in isolation.

pub mod lang;
pub mod parse;
pub mod paths;
pub mod state;
pub mod task;
