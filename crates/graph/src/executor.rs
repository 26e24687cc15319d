use crate::state::State;
use crate::{GraphError, StateGraph};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Receives a failure event for every task that errors, before the error is
/// re-raised. Implemented by the error classifier.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn task_failed(&self, event: Value);
}

/// How an execution ended.
#[derive(Debug)]
pub enum Outcome {
    Completed(Value),
    /// A choice state matched no branch and had no default. The execution
    /// halts where it stands; an operator investigates via the warning
    /// logged with the state name.
    Stalled {
        state: String,
        payload: Value,
    },
}

impl Outcome {
    pub fn into_payload(self) -> Value {
        match self {
            Outcome::Completed(payload) => payload,
            Outcome::Stalled { payload, .. } => payload,
        }
    }
}

/// Walks a graph from its start state. Every task failure is first handed to
/// the failure sink and then re-raised so the owning execution is marked
/// failed.
pub struct Executor {
    failure_sink: Option<Arc<dyn FailureSink>>,
}

impl Executor {
    pub fn new(failure_sink: Option<Arc<dyn FailureSink>>) -> Self {
        Executor { failure_sink }
    }

    pub async fn run(&self, graph: &StateGraph, input: Value) -> Result<Outcome, GraphError> {
        let mut payload: Value = input;
        let mut current: String = graph.start_at().to_string();

        loop {
            let state = graph
                .state(&current)
                .ok_or_else(|| GraphError::UnknownState {
                    graph: graph.name().to_string(),
                    state: current.clone(),
                })?;

            let next: Option<String> = match state {
                State::Task { resource, next } => {
                    info!(graph = graph.name(), state = current.as_str(), "Task");

                    match resource.run(payload.clone()).await {
                        Ok(result) => payload = result,
                        Err(err) => {
                            self.report_failure(&payload, &current, err.message()).await;

                            return Err(GraphError::TaskFailed {
                                state: current,
                                source: err,
                            });
                        }
                    }

                    next.clone()
                }
                State::Choice { choices, default } => {
                    let matched = choices
                        .iter()
                        .find(|branch| branch.condition.matches(&payload))
                        .map(|branch| branch.next.clone())
                        .or_else(|| default.clone());

                    match matched {
                        Some(next) => Some(next),
                        None => {
                            warn!(
                                graph = graph.name(),
                                state = current.as_str(),
                                guid = payload_guid(&payload),
                                "Choice matched no branch and has no default, halting"
                            );

                            return Ok(Outcome::Stalled {
                                state: current,
                                payload,
                            });
                        }
                    }
                }
                State::Pass { next } => {
                    info!(graph = graph.name(), state = current.as_str(), "Pass");

                    next.clone()
                }
            };

            match next {
                Some(next) => current = next,
                None => return Ok(Outcome::Completed(payload)),
            }
        }
    }

    async fn report_failure(&self, payload: &Value, state: &str, message: &str) {
        if let Some(sink) = &self.failure_sink {
            sink.task_failed(json!({
                "guid": payload_guid(payload),
                "function": state,
                "error": message,
            }))
            .await;
        }
    }
}

fn payload_guid(payload: &Value) -> &str {
    payload
        .get("guid")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
