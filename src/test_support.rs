//! Test-only helpers: task tree constructors and a scripted model client.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::Result;

use crate::core::task::{ArtifactKind, ImplementationDetails, Task};
use crate::io::gateway::{ChatRequest, GatewayError, ModelClient};
use crate::repair::{ProjectRunner, RunRequest, RunVerdict};

/// Create a plain leaf task with deterministic fields.
pub fn leaf(name: &str) -> Task {
    Task {
        name: name.to_string(),
        description: format!("{name} description"),
        ..Task::default()
    }
}

/// Create a leaf eligible for code generation at `file_path`.
pub fn codable_leaf(name: &str, file_path: &str) -> Task {
    let mut task = leaf(name);
    task.file_path = Some(file_path.to_string());
    task.implementation_details = Some(ImplementationDetails {
        kind: Some(ArtifactKind::Function),
        expected_loc: 10,
        to_be_coded: true,
        logic: Some(format!("{name} logic")),
        ..ImplementationDetails::default()
    });
    task
}

/// Create a composite node with the given children.
pub fn node_with_children(name: &str, children: Vec<Task>) -> Task {
    Task {
        subtasks: children,
        ..leaf(name)
    }
}

/// Model client that replays a fixed queue of responses.
///
/// Each `complete` call pops the front of the queue; an empty queue is a
/// test bug and fails loudly.
pub struct ScriptedClient {
    responses: RefCell<VecDeque<Result<String, GatewayError>>>,
    calls: Cell<usize>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into_iter().collect()),
            calls: Cell::new(0),
        }
    }

    /// Client whose every response is the same text.
    pub fn repeating(text: &str, count: usize) -> Self {
        Self::new((0..count).map(|_| Ok(text.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ModelClient for ScriptedClient {
    fn complete(&self, _request: &ChatRequest) -> Result<String, GatewayError> {
        self.calls.set(self.calls.get() + 1);
        self.responses
            .borrow_mut()
            .pop_front()
            .expect("scripted client ran out of responses")
    }
}

/// Project runner that replays a fixed queue of verdicts.
pub struct ScriptedRunner {
    verdicts: RefCell<VecDeque<RunVerdict>>,
    runs: Cell<u32>,
}

impl ScriptedRunner {
    pub fn new(verdicts: Vec<RunVerdict>) -> Self {
        Self {
            verdicts: RefCell::new(verdicts.into_iter().collect()),
            runs: Cell::new(0),
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.get()
    }
}

impl ProjectRunner for ScriptedRunner {
    fn run(&self, _request: &RunRequest) -> Result<RunVerdict> {
        self.runs.set(self.runs.get() + 1);
        Ok(self
            .verdicts
            .borrow_mut()
            .pop_front()
            .expect("scripted runner ran out of verdicts"))
    }
}
