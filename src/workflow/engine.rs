use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    agent::{
        core::AgentBehavior,
        execution::{ExecutionResult, result::value_text},
    },
    error::{AgentError, Error, ErrorKind, Result},
    shared::{SharedState, StateMetadata},
    workflow::{
        human::HumanInputHandler,
        node::{INPUT_KEY, NodeKind, PredicateContext, WorkflowNode, error_key, output_key},
    },
};

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Ceiling on node visits per run, counted across all branches.
    pub max_steps: usize,
    pub human_input_timeout: Option<Duration>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            human_input_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub name: String,
    pub description: String,
    pub start_node: String,
    pub nodes: Vec<WorkflowNode>,
}

impl WorkflowConfig {
    pub fn new(name: &str, start_node: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            start_node: start_node.to_string(),
            nodes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub kind: String,
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

impl NodeResult {
    fn succeeded(node: &WorkflowNode, output: Value, duration_ms: u64) -> Self {
        Self {
            node_id: node.id.clone(),
            kind: node.kind.label().to_string(),
            success: true,
            output,
            error: None,
            error_kind: None,
            duration_ms,
        }
    }

    fn failed(node: &WorkflowNode, kind: ErrorKind, error: &str, duration_ms: u64) -> Self {
        Self {
            node_id: node.id.clone(),
            kind: node.kind.label().to_string(),
            success: false,
            output: Value::Null,
            error: Some(error.to_string()),
            error_kind: Some(kind),
            duration_ms,
        }
    }

    fn from_execution(node: &WorkflowNode, result: &ExecutionResult, duration_ms: u64) -> Self {
        Self {
            output: result.output().clone(),
            error: result.error_message().map(str::to_string),
            error_kind: result.error_kind(),
            success: result.is_success(),
            ..Self::succeeded(node, Value::Null, duration_ms)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow: String,
    pub success: bool,
    /// Output of the last node completed on the main path.
    pub output: Value,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub node_results: Vec<NodeResult>,
    /// Node ids in visit order; parallel branches appear in join order.
    pub visited: Vec<String>,
    pub steps: usize,
    pub state: BTreeMap<String, Value>,
    pub duration_ms: u64,
}

/// Per-path traversal record.
struct Branch {
    visited: Vec<String>,
    node_results: Vec<NodeResult>,
    last_output: Option<Value>,
}

impl Branch {
    fn new(last_output: Option<Value>) -> Self {
        Self {
            visited: Vec::new(),
            node_results: Vec::new(),
            last_output,
        }
    }

    fn absorb(&mut self, other: Branch) {
        self.visited.extend(other.visited);
        self.node_results.extend(other.node_results);
    }

    fn fail(
        &mut self,
        node: &WorkflowNode,
        kind: ErrorKind,
        message: String,
        started: Instant,
    ) -> AgentError {
        self.node_results.push(NodeResult::failed(
            node,
            kind,
            &message,
            elapsed_ms(started),
        ));
        AgentError::NodeFailed {
            node_id: node.id.clone(),
            kind,
            message,
        }
    }
}

/// A validated graph of nodes bound to the agents it runs.
pub struct Workflow {
    name: String,
    description: String,
    start_node: String,
    nodes: HashMap<String, WorkflowNode>,
    agents: HashMap<String, Arc<dyn AgentBehavior>>,
    settings: WorkflowSettings,
    human: Option<Arc<dyn HumanInputHandler>>,
}

impl Workflow {
    /// Builds a workflow; agents are referenced from nodes by name.
    pub fn new<I>(config: WorkflowConfig, settings: WorkflowSettings, agents: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn AgentBehavior>>,
    {
        let mut by_name = HashMap::new();
        for agent in agents {
            let name = agent.get_name().to_string();
            if by_name.insert(name.clone(), agent).is_some() {
                return Err(invalid(format!("agent name '{}' is used twice", name)));
            }
        }

        let mut nodes = HashMap::new();
        for node in config.nodes {
            if nodes.contains_key(&node.id) {
                return Err(invalid(format!("node id '{}' is used twice", node.id)));
            }
            nodes.insert(node.id.clone(), node);
        }

        let workflow = Self {
            name: config.name,
            description: config.description,
            start_node: config.start_node,
            nodes,
            agents: by_name,
            settings,
            human: None,
        };
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn with_human_handler(mut self, handler: Arc<dyn HumanInputHandler>) -> Self {
        self.human = Some(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn get_node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(node_id)
    }

    fn validate(&self) -> Result<()> {
        if self.settings.max_steps == 0 {
            return Err(invalid("max_steps must be at least 1".into()));
        }
        if !self.nodes.contains_key(&self.start_node) {
            return Err(invalid(format!("start node '{}' does not exist", self.start_node)));
        }

        let known: HashSet<&str> = self.nodes.keys().map(String::as_str).collect();
        for node in self.nodes.values() {
            if let Some(missing) = node.next_nodes.iter().find(|n| !known.contains(n.as_str())) {
                return Err(invalid(format!(
                    "node '{}' points to unknown node '{}'",
                    node.id, missing
                )));
            }

            let edges = node.next_nodes.len();
            match &node.kind {
                NodeKind::Agent { agent, .. } => {
                    if !self.agents.contains_key(agent) {
                        return Err(invalid(format!(
                            "node '{}' uses unknown agent '{}'",
                            node.id, agent
                        )));
                    }
                    if edges > 1 {
                        return Err(single_edge(node));
                    }
                }
                NodeKind::Condition { .. } if edges != 2 => {
                    return Err(invalid(format!(
                        "condition node '{}' needs exactly two edges, found {}",
                        node.id, edges
                    )));
                }
                NodeKind::Condition { .. } => {}
                NodeKind::Parallel { then } => {
                    if edges == 0 {
                        return Err(invalid(format!(
                            "parallel node '{}' has no branches",
                            node.id
                        )));
                    }
                    if let Some(join) = then {
                        if !known.contains(join.as_str()) {
                            return Err(invalid(format!(
                                "parallel node '{}' joins at unknown node '{}'",
                                node.id, join
                            )));
                        }
                    }
                }
                NodeKind::Sequential { children } => {
                    if edges > 1 {
                        return Err(single_edge(node));
                    }
                    for child in children {
                        match self.nodes.get(child).map(|c| &c.kind) {
                            None => {
                                return Err(invalid(format!(
                                    "sequential node '{}' lists unknown child '{}'",
                                    node.id, child
                                )));
                            }
                            Some(NodeKind::Agent { .. })
                            | Some(NodeKind::HumanInLoop { .. })
                            | Some(NodeKind::Sequential { .. }) => {}
                            Some(other) => {
                                return Err(invalid(format!(
                                    "sequential node '{}' cannot contain {} node '{}'",
                                    node.id,
                                    other.label(),
                                    child
                                )));
                            }
                        }
                    }
                }
                NodeKind::HumanInLoop { .. } => {
                    if edges > 1 {
                        return Err(single_edge(node));
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn run(&self, input: Value) -> WorkflowResult {
        self.run_with_state(input, SharedState::new()).await
    }

    /// Runs against a caller-owned store, so other parties can observe or
    /// seed the shared state.
    pub async fn run_with_state(&self, input: Value, state: SharedState) -> WorkflowResult {
        let started = Instant::now();
        info!("Workflow {} started", self.name);

        state.set(INPUT_KEY, input, Some(StateMetadata::by("workflow")));
        let steps = AtomicUsize::new(0);
        let mut branch = Branch::new(None);

        let outcome = self
            .walk(self.start_node.clone(), &state, &steps, &mut branch)
            .await;

        let (error, error_kind) = match &outcome {
            Ok(()) => {
                info!("Workflow {} completed", self.name);
                (None, None)
            }
            Err(e) => {
                warn!("Workflow {} failed: {}", self.name, e);
                (Some(e.to_string()), Some(e.kind()))
            }
        };

        WorkflowResult {
            workflow: self.name.clone(),
            success: outcome.is_ok(),
            output: branch.last_output.unwrap_or(Value::Null),
            error,
            error_kind,
            node_results: branch.node_results,
            visited: branch.visited,
            steps: steps.load(Ordering::SeqCst).min(self.settings.max_steps),
            state: state.snapshot(),
            duration_ms: elapsed_ms(started),
        }
    }

    fn node(&self, node_id: &str) -> std::result::Result<&WorkflowNode, AgentError> {
        self.nodes.get(node_id).ok_or_else(|| {
            AgentError::Internal(format!("node '{}' vanished from the graph", node_id))
        })
    }

    fn take_step(&self, steps: &AtomicUsize) -> std::result::Result<(), AgentError> {
        if steps.fetch_add(1, Ordering::SeqCst) >= self.settings.max_steps {
            warn!(
                "Workflow {} hit its ceiling of {} steps",
                self.name, self.settings.max_steps
            );
            return Err(AgentError::WorkflowCeilingExceeded(self.settings.max_steps));
        }
        Ok(())
    }

    /// Follows edges from `start` until a node without a next edge.
    fn walk<'a>(
        &'a self,
        start: String,
        state: &'a SharedState,
        steps: &'a AtomicUsize,
        branch: &'a mut Branch,
    ) -> BoxFuture<'a, std::result::Result<(), AgentError>> {
        async move {
            let mut current = Some(start);
            while let Some(node_id) = current.take() {
                let node = self.node(&node_id)?;
                self.take_step(steps)?;
                branch.visited.push(node.id.clone());
                debug!(
                    "Workflow {} visiting node {} ({})",
                    self.name,
                    node.id,
                    node.kind.label()
                );

                current = match &node.kind {
                    NodeKind::Condition { predicate } => {
                        let taken = {
                            let context = PredicateContext::new(state, branch.last_output.as_ref());
                            predicate.evaluate(&context)
                        };
                        branch
                            .node_results
                            .push(NodeResult::succeeded(node, Value::Bool(taken), 0));
                        node.next_nodes.get(if taken { 0 } else { 1 }).cloned()
                    }
                    NodeKind::Parallel { then } => {
                        self.run_parallel(node, state, steps, branch).await?;
                        then.clone()
                    }
                    _ => {
                        self.visit(node, state, steps, branch).await?;
                        node.next_nodes.first().cloned()
                    }
                };
            }
            Ok(())
        }
        .boxed()
    }

    /// Runs one AGENT, HUMAN_IN_LOOP or SEQUENTIAL node without following
    /// its edges.
    fn visit<'a>(
        &'a self,
        node: &'a WorkflowNode,
        state: &'a SharedState,
        steps: &'a AtomicUsize,
        branch: &'a mut Branch,
    ) -> BoxFuture<'a, std::result::Result<(), AgentError>> {
        async move {
            match &node.kind {
                NodeKind::Agent {
                    agent,
                    input_key,
                    output_key,
                } => {
                    self.run_agent(
                        node,
                        agent,
                        input_key.as_deref(),
                        output_key.as_deref(),
                        state,
                        branch,
                    )
                    .await
                }
                NodeKind::HumanInLoop { prompt } => {
                    self.run_human(node, prompt, state, branch).await
                }
                NodeKind::Sequential { children } => {
                    let started = Instant::now();
                    for child_id in children {
                        let child = self.node(child_id)?;
                        self.take_step(steps)?;
                        branch.visited.push(child.id.clone());
                        self.visit(child, state, steps, branch).await?;
                    }
                    let output = branch.last_output.clone().unwrap_or(Value::Null);
                    state.set(
                        &output_key(&node.id),
                        output.clone(),
                        Some(StateMetadata::by(&node.id)),
                    );
                    branch
                        .node_results
                        .push(NodeResult::succeeded(node, output, elapsed_ms(started)));
                    Ok(())
                }
                other => Err(AgentError::Internal(format!(
                    "{} node '{}' cannot run inline",
                    other.label(),
                    node.id
                ))),
            }
        }
        .boxed()
    }

    async fn run_agent(
        &self,
        node: &WorkflowNode,
        agent_name: &str,
        input_key: Option<&str>,
        extra_key: Option<&str>,
        state: &SharedState,
        branch: &mut Branch,
    ) -> std::result::Result<(), AgentError> {
        let started = Instant::now();
        let Some(agent) = self.agents.get(agent_name) else {
            let message = format!("unknown agent '{}'", agent_name);
            return Err(branch.fail(node, ErrorKind::Configuration, message, started));
        };

        let input = input_key
            .and_then(|key| state.get(key))
            .or_else(|| branch.last_output.clone())
            .or_else(|| state.get(INPUT_KEY))
            .unwrap_or(Value::Null);

        let result = agent.execute(&value_text(&input)).await;
        branch
            .node_results
            .push(NodeResult::from_execution(node, &result, elapsed_ms(started)));

        if result.is_success() {
            let output = result.into_output();
            let metadata = StateMetadata::by(agent.get_id()).with_extra(json!({ "node": node.id }));
            state.set(&output_key(&node.id), output.clone(), Some(metadata.clone()));
            if let Some(key) = extra_key {
                state.set(key, output.clone(), Some(metadata));
            }
            branch.last_output = Some(output);
            return Ok(());
        }

        let kind = result.error_kind().unwrap_or(ErrorKind::Internal);
        let message = result.error_message().unwrap_or_default().to_string();
        if node.continue_on_error {
            warn!("Node {} failed, continuing: {}", node.id, message);
            state.set(
                &error_key(&node.id),
                json!({ "error": message, "kind": kind }),
                Some(StateMetadata::by(&node.id)),
            );
            return Ok(());
        }

        Err(AgentError::NodeFailed {
            node_id: node.id.clone(),
            kind,
            message,
        })
    }

    async fn run_human(
        &self,
        node: &WorkflowNode,
        prompt: &str,
        state: &SharedState,
        branch: &mut Branch,
    ) -> std::result::Result<(), AgentError> {
        let started = Instant::now();
        let Some(handler) = &self.human else {
            let message = "no human input handler is configured".to_string();
            return Err(branch.fail(node, ErrorKind::Configuration, message, started));
        };

        info!("Workflow {} waiting for human input at {}", self.name, node.id);
        let request = handler.request_input(prompt);
        let answer = match self.settings.human_input_timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(answer) => answer,
                Err(_) => {
                    let message = AgentError::TaskTimeout(limit.as_millis()).to_string();
                    return Err(branch.fail(node, ErrorKind::TaskTimeout, message, started));
                }
            },
            None => request.await,
        };

        match answer {
            Ok(value) => {
                state.set(
                    &output_key(&node.id),
                    value.clone(),
                    Some(StateMetadata::by("human")),
                );
                branch
                    .node_results
                    .push(NodeResult::succeeded(node, value.clone(), elapsed_ms(started)));
                branch.last_output = Some(value);
                Ok(())
            }
            Err(e) => Err(branch.fail(node, e.kind(), e.message(), started)),
        }
    }

    /// Fans out one forked state per edge, then merges each branch's writes
    /// as it finishes, so the branch completing last wins a shared key.
    async fn run_parallel(
        &self,
        node: &WorkflowNode,
        state: &SharedState,
        steps: &AtomicUsize,
        branch: &mut Branch,
    ) -> std::result::Result<(), AgentError> {
        let started = Instant::now();
        let mut pending = FuturesUnordered::new();
        for edge in &node.next_nodes {
            let fork = state.fork();
            let since = fork.version();
            let last_output = branch.last_output.clone();
            pending.push(async move {
                let mut sub = Branch::new(last_output);
                let outcome = self.walk(edge.clone(), &fork, steps, &mut sub).await;
                (edge, fork, since, sub, outcome)
            });
        }

        let mut outputs = serde_json::Map::new();
        let mut failure = None;
        while let Some((edge, fork, since, sub, outcome)) = pending.next().await {
            state.merge(fork.writes_since(since));
            debug!("Branch {} of node {} joined", edge, node.id);

            outputs.insert(edge.clone(), sub.last_output.clone().unwrap_or(Value::Null));
            branch.absorb(sub);
            if let Err(e) = outcome {
                warn!("Branch {} of node {} failed: {}", edge, node.id, e);
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            branch.node_results.push(NodeResult::failed(
                node,
                e.kind(),
                &e.to_string(),
                elapsed_ms(started),
            ));
            return Err(e);
        }

        let output = Value::Object(outputs);
        state.set(
            &output_key(&node.id),
            output.clone(),
            Some(StateMetadata::by(&node.id)),
        );
        branch
            .node_results
            .push(NodeResult::succeeded(node, output.clone(), elapsed_ms(started)));
        branch.last_output = Some(output);
        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::AgentError(AgentError::Configuration(message))
}

fn single_edge(node: &WorkflowNode) -> Error {
    invalid(format!(
        "{} node '{}' may have at most one outgoing edge",
        node.kind.label(),
        node.id
    ))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
