use crate::{Branch, GraphError, StepTask};
use std::collections::HashMap;
use std::sync::Arc;

pub enum State {
    Task {
        resource: Arc<dyn StepTask>,
        next: Option<String>,
    },
    Choice {
        choices: Vec<Branch>,
        default: Option<String>,
    },
    Pass {
        next: Option<String>,
    },
}

/// A named workflow definition. States with no `next` are terminal.
pub struct StateGraph {
    name: String,
    start_at: String,
    states: HashMap<String, State>,
}

impl StateGraph {
    pub fn builder(name: impl Into<String>) -> GraphBuilder {
        GraphBuilder {
            name: name.into(),
            start_at: None,
            states: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_at(&self) -> &str {
        &self.start_at
    }

    pub(crate) fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }
}

pub struct GraphBuilder {
    name: String,
    start_at: Option<String>,
    states: HashMap<String, State>,
}

impl GraphBuilder {
    /// Add a task state. The first state added becomes the start state.
    pub fn task(
        self,
        name: impl Into<String>,
        resource: Arc<dyn StepTask>,
        next: Option<&str>,
    ) -> Self {
        self.insert(
            name.into(),
            State::Task {
                resource,
                next: next.map(str::to_string),
            },
        )
    }

    pub fn choice(
        self,
        name: impl Into<String>,
        choices: Vec<Branch>,
        default: Option<&str>,
    ) -> Self {
        self.insert(
            name.into(),
            State::Choice {
                choices,
                default: default.map(str::to_string),
            },
        )
    }

    pub fn pass(self, name: impl Into<String>, next: Option<&str>) -> Self {
        self.insert(
            name.into(),
            State::Pass {
                next: next.map(str::to_string),
            },
        )
    }

    fn insert(mut self, name: String, state: State) -> Self {
        if self.start_at.is_none() {
            self.start_at = Some(name.clone());
        }
        self.states.insert(name, state);
        self
    }

    /// Validate every transition target and produce the graph.
    pub fn build(self) -> Result<StateGraph, GraphError> {
        let graph = StateGraph {
            start_at: self.start_at.clone().unwrap_or_default(),
            name: self.name,
            states: self.states,
        };

        let mut targets: Vec<&String> = Vec::new();
        for state in graph.states.values() {
            match state {
                State::Task { next, .. } | State::Pass { next } => targets.extend(next.iter()),
                State::Choice { choices, default } => {
                    targets.extend(choices.iter().map(|branch| &branch.next));
                    targets.extend(default.iter());
                }
            }
        }
        targets.push(&graph.start_at);

        for target in targets {
            if !graph.states.contains_key(target) {
                return Err(GraphError::UnknownState {
                    graph: graph.name.clone(),
                    state: target.clone(),
                });
            }
        }

        Ok(graph)
    }
}
