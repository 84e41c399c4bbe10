use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::{agent::execution::result::value_text, shared::SharedState};

/// What a predicate may look at when a CONDITION node is evaluated.
pub struct PredicateContext<'a> {
    state: &'a SharedState,
    last_output: Option<&'a Value>,
}

impl<'a> PredicateContext<'a> {
    pub fn new(state: &'a SharedState, last_output: Option<&'a Value>) -> Self {
        Self { state, last_output }
    }

    pub fn state(&self) -> &SharedState {
        self.state
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.get(key)
    }

    /// Output of the most recently completed node on this path.
    pub fn last_output(&self) -> Option<&Value> {
        self.last_output
    }

    pub fn node_output(&self, node_id: &str) -> Option<Value> {
        self.state.get(&output_key(node_id))
    }
}

/// Pure boolean test over shared state and recent outputs.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&PredicateContext<'_>) -> bool + Send + Sync>);

impl Predicate {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&PredicateContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    pub fn evaluate(&self, context: &PredicateContext<'_>) -> bool {
        (self.0)(context)
    }

    pub fn state_equals(key: &str, expected: Value) -> Self {
        let key = key.to_string();
        Self::new(move |ctx| ctx.get(&key).is_some_and(|v| v == expected))
    }

    pub fn state_exists(key: &str) -> Self {
        let key = key.to_string();
        Self::new(move |ctx| ctx.state().has(&key))
    }

    /// True when the latest node output, rendered as text, contains `needle`.
    pub fn output_contains(needle: &str) -> Self {
        let needle = needle.to_string();
        Self::new(move |ctx| {
            ctx.last_output()
                .is_some_and(|v| value_text(v).contains(needle.as_str()))
        })
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Runs the named agent. Input comes from `input_key` in shared state
    /// when set, else the latest output, else the workflow input. The output
    /// is stored under `<id>.output` and, when set, under `output_key`.
    Agent {
        agent: String,
        input_key: Option<String>,
        output_key: Option<String>,
    },
    /// Edges are read positionally: `[on_true, on_false]`.
    Condition { predicate: Predicate },
    /// Every edge starts a concurrent branch; `then` runs after the join.
    Parallel { then: Option<String> },
    /// Runs the listed children in order; their own edges are not followed.
    Sequential { children: Vec<String> },
    HumanInLoop { prompt: String },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Agent { .. } => "agent",
            NodeKind::Condition { .. } => "condition",
            NodeKind::Parallel { .. } => "parallel",
            NodeKind::Sequential { .. } => "sequential",
            NodeKind::HumanInLoop { .. } => "human_in_loop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub next_nodes: Vec<String>,
    /// Best-effort: a failed agent run is recorded and traversal goes on.
    pub continue_on_error: bool,
}

impl WorkflowNode {
    pub fn new(id: &str, kind: NodeKind) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            next_nodes: Vec::new(),
            continue_on_error: false,
        }
    }

    pub fn agent(id: &str, agent: &str) -> Self {
        Self::new(
            id,
            NodeKind::Agent {
                agent: agent.to_string(),
                input_key: None,
                output_key: None,
            },
        )
    }

    pub fn condition(id: &str, predicate: Predicate, on_true: &str, on_false: &str) -> Self {
        Self::new(id, NodeKind::Condition { predicate }).with_next(&[on_true, on_false])
    }

    pub fn parallel(id: &str, branches: &[&str]) -> Self {
        Self::new(id, NodeKind::Parallel { then: None }).with_next(branches)
    }

    pub fn sequential(id: &str, children: &[&str]) -> Self {
        Self::new(
            id,
            NodeKind::Sequential {
                children: children.iter().map(|c| c.to_string()).collect(),
            },
        )
    }

    pub fn human(id: &str, prompt: &str) -> Self {
        Self::new(
            id,
            NodeKind::HumanInLoop {
                prompt: prompt.to_string(),
            },
        )
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_next(mut self, next: &[&str]) -> Self {
        self.next_nodes
            .extend(next.iter().map(|n| n.to_string()));
        self
    }

    /// Join continuation of a PARALLEL node; ignored for other kinds.
    pub fn join_at(mut self, node_id: &str) -> Self {
        if let NodeKind::Parallel { then } = &mut self.kind {
            *then = Some(node_id.to_string());
        }
        self
    }

    /// Shared-state key an AGENT node reads its input from.
    pub fn with_input_key(mut self, key: &str) -> Self {
        if let NodeKind::Agent { input_key, .. } = &mut self.kind {
            *input_key = Some(key.to_string());
        }
        self
    }

    /// Extra shared-state key an AGENT node also writes its output to.
    pub fn with_output_key(mut self, key: &str) -> Self {
        if let NodeKind::Agent { output_key, .. } = &mut self.kind {
            *output_key = Some(key.to_string());
        }
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

pub const INPUT_KEY: &str = "workflow.input";

pub fn output_key(node_id: &str) -> String {
    format!("{}.output", node_id)
}

pub fn error_key(node_id: &str) -> String {
    format!("{}.error", node_id)
}
