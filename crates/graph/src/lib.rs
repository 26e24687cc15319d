//! Workflow state graphs as data.
//!
//! A graph is a set of named states: `Task` states delegate to one atomic
//! external call and carry the full payload forward, `Choice` states pick the
//! first matching branch, `Pass` states tag a chosen branch for
//! observability. The executor walks the graph over a JSON payload; it has no
//! knowledge of what the tasks do.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{Display, Formatter};

mod condition;
mod executor;
mod state;

pub use condition::{Branch, Condition};
pub use executor::{Executor, FailureSink, Outcome};
pub use state::{GraphBuilder, State, StateGraph};

/// One atomic step of a workflow. Implementations receive the accumulated
/// payload and return it enriched with whatever they produced.
#[async_trait]
pub trait StepTask: Send + Sync {
    async fn run(&self, payload: Value) -> Result<Value, TaskError>;
}

/// Failure of a single task state.
#[derive(Debug)]
pub struct TaskError {
    message: String,
    source: Option<model::Error>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        TaskError {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source(err: impl Into<model::Error>) -> Self {
        let source: model::Error = err.into();
        TaskError {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph {graph} references unknown state {state}")]
    UnknownState { graph: String, state: String },

    #[error("state {state} failed: {source}")]
    TaskFailed {
        state: String,
        #[source]
        source: TaskError,
    },
}
