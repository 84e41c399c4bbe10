use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    agent::execution::ExecutionResult,
    error::{AgentError, Error, ErrorKind, Result},
    multi_agent::{
        communication::{TaskMessage, TaskTransport},
        coordination::task::{Task, TaskState},
        discovery::AgentDiscovery,
        registry::{AgentRecord, AgentRegistry},
    },
};

pub type ScoreFn = Arc<dyn Fn(&AgentRecord) -> f64 + Send + Sync>;

#[derive(Debug, Clone)]
pub struct DelegationConfig {
    /// Used when a request carries no timeout of its own.
    pub default_timeout: Duration,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct DelegationRequest {
    pub source_agent_id: String,
    pub target_agent_id: Option<String>,
    pub capability: String,
    pub input: Value,
    pub timeout: Option<Duration>,
    /// Scoring for auto-resolution; without it the first registered match wins.
    pub criteria: Option<ScoreFn>,
}

impl DelegationRequest {
    pub fn new(source_agent_id: &str, capability: &str, input: Value) -> Self {
        Self {
            source_agent_id: source_agent_id.to_string(),
            target_agent_id: None,
            capability: capability.to_string(),
            input,
            timeout: None,
            criteria: None,
        }
    }

    pub fn to_agent(mut self, agent_id: &str) -> Self {
        self.target_agent_id = Some(agent_id.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_criteria<F>(mut self, criteria: F) -> Self
    where
        F: Fn(&AgentRecord) -> f64 + Send + Sync + 'static,
    {
        self.criteria = Some(Arc::new(criteria));
        self
    }
}

/// Routes capability-addressed tasks to registered agents under a deadline.
pub struct TaskDelegator {
    registry: Arc<AgentRegistry>,
    discovery: AgentDiscovery,
    transport: Arc<dyn TaskTransport>,
    config: DelegationConfig,
    tasks: DashMap<String, Task>,
}

impl TaskDelegator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        transport: Arc<dyn TaskTransport>,
        config: DelegationConfig,
    ) -> Self {
        Self {
            discovery: AgentDiscovery::new(registry.clone()),
            registry,
            transport,
            config,
            tasks: DashMap::new(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.value().clone())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Drops terminal tasks last updated more than `older_than` ago.
    /// Running and pending tasks are kept. Returns how many were removed.
    pub fn prune_terminal(&self, older_than: Duration) -> usize {
        let cutoff = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.tasks.len();
        self.tasks
            .retain(|_, task| !(task.state().is_terminal() && task.updated_at <= cutoff));
        let removed = before.saturating_sub(self.tasks.len());
        if removed > 0 {
            debug!("Pruned {} finished tasks", removed);
        }
        removed
    }

    fn resolve(&self, request: &DelegationRequest) -> Result<AgentRecord> {
        let capability = request.capability.as_str();

        if let Some(target_id) = &request.target_agent_id {
            let record = self.registry.get(target_id).ok_or_else(|| {
                Error::AgentError(AgentError::AgentNotFound(target_id.clone()))
            })?;
            if !self.registry.is_available(&record) || !record.has_capability(capability) {
                warn!(
                    "Agent {} cannot take capability {} right now",
                    target_id, capability
                );
                return Err(Error::AgentError(AgentError::NoMatchingAgent(
                    capability.to_string(),
                )));
            }
            return Ok(record);
        }

        let found = match &request.criteria {
            Some(criteria) => self
                .discovery
                .find_best_agent(capability, |record| criteria(record)),
            None => self.discovery.discover(&[capability]).into_iter().next(),
        };
        found.ok_or_else(|| Error::AgentError(AgentError::NoMatchingAgent(capability.to_string())))
    }

    fn record_state(&self, task_id: &str, next: TaskState, error: Option<&str>) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            let outcome = match error {
                Some(error) => task.fail(next, error),
                None => task.transition(next),
            };
            if let Err(e) = outcome {
                warn!("{}", e);
            }
        }
    }

    /// Sends one task and waits for it until the deadline.
    ///
    /// On timeout the caller stops waiting; the handler keeps running
    /// detached and its late completion is only logged.
    pub async fn delegate(&self, request: DelegationRequest) -> ExecutionResult {
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);
        let mut task = Task::new(
            &request.source_agent_id,
            &request.capability,
            request.input.clone(),
            timeout,
        );
        let task_id = task.id.clone();

        let target = match self.resolve(&request) {
            Ok(target) => target,
            Err(e) => {
                if let Err(err) = task.fail(TaskState::Failed, &e.message()) {
                    warn!("{}", err);
                }
                self.tasks.insert(task_id.clone(), task);
                return task_error(&task_id, e.kind(), e.message());
            }
        };

        if let Err(e) = task
            .resolve_target(&target.id)
            .and_then(|_| task.transition(TaskState::Running))
        {
            return task_error(&task_id, e.kind(), e.message());
        }
        self.tasks.insert(task_id.clone(), task);
        info!(
            "Delegating task {} ({}) to agent {}",
            task_id, request.capability, target.id
        );

        let mut message = TaskMessage::new(
            &request.source_agent_id,
            &target.id,
            &request.capability,
            request.input,
        )
        .with_task_id(&task_id);
        if let Some(deadline) = TimeDelta::from_std(timeout)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
        {
            message = message.with_deadline(deadline);
        }

        let (tx, rx) = oneshot::channel();
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let outcome = transport.send(message).await;
            if let Err(outcome) = tx.send(outcome) {
                match outcome {
                    Ok(response) => info!(
                        "Task {} finished after its deadline (success: {}), result discarded",
                        response.task_id, response.success
                    ),
                    Err(e) => warn!("Task delivery failed after its deadline: {}", e),
                }
            }
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(response))) => {
                let result = response.into_result();
                if result.is_success() {
                    self.record_state(&task_id, TaskState::Succeeded, None);
                } else {
                    self.record_state(&task_id, TaskState::Failed, result.error_message());
                }
                debug!("Task {} completed", task_id);
                result
            }
            Ok(Ok(Err(e))) => {
                self.record_state(&task_id, TaskState::Failed, Some(&e.message()));
                task_error(&task_id, e.kind(), e.message())
            }
            Ok(Err(_)) => {
                let error = "task worker ended without a response";
                self.record_state(&task_id, TaskState::Failed, Some(error));
                task_error(&task_id, ErrorKind::Internal, error.to_string())
            }
            Err(_) => {
                let error = AgentError::TaskTimeout(timeout.as_millis()).to_string();
                warn!("Task {} on agent {}: {}", task_id, target.id, error);
                self.record_state(&task_id, TaskState::TimedOut, Some(&error));
                task_error(&task_id, ErrorKind::TaskTimeout, error)
            }
        }
    }

    /// Runs independent delegations concurrently; results follow input order.
    pub async fn delegate_parallel(
        &self,
        requests: Vec<DelegationRequest>,
    ) -> Vec<ExecutionResult> {
        join_all(requests.into_iter().map(|request| self.delegate(request))).await
    }
}

fn task_error(task_id: &str, kind: ErrorKind, error: String) -> ExecutionResult {
    ExecutionResult::error(kind, error)
        .with_metadata("task_id", Value::String(task_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::{
            LlmAgent,
            core::{AgentBehavior, handler_fn},
            types::{AgentCapability, AgentConfig},
        },
        model::{ModelResponse, ScriptedModelClient},
        multi_agent::{communication::InProcessTransport, registry::RegistryConfig},
        tools::ToolRegistry,
    };
    use serde_json::json;

    struct Fixture {
        registry: Arc<AgentRegistry>,
        transport: Arc<InProcessTransport>,
        agents: Vec<Arc<dyn AgentBehavior>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Arc::new(AgentRegistry::new(RegistryConfig::default())),
                transport: Arc::new(InProcessTransport::new()),
                agents: Vec::new(),
            }
        }

        fn add(&mut self, id: &str, capability: &str, delay_ms: u64) {
            let model = Arc::new(ScriptedModelClient::repeating(ModelResponse::final_text(
                "unused",
            )));
            let label = id.to_string();
            let agent: Arc<dyn AgentBehavior> = Arc::new(
                LlmAgent::new(AgentConfig::new(id, "m"), model, Arc::new(ToolRegistry::new()))
                    .with_id(id)
                    .with_capability_handler(
                        AgentCapability::new(capability, "test"),
                        handler_fn(move |input| {
                            let label = label.clone();
                            async move {
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                                Ok(json!({"agent": label, "input": input}))
                            }
                        }),
                    ),
            );
            self.registry
                .register(AgentRecord::from_agent(agent.as_ref()))
                .unwrap();
            self.transport.attach(&agent);
            self.agents.push(agent);
        }

        fn delegator(&self) -> TaskDelegator {
            TaskDelegator::new(
                self.registry.clone(),
                self.transport.clone(),
                DelegationConfig::default(),
            )
        }
    }

    #[tokio::test]
    async fn test_auto_resolution_picks_first_registered() {
        let mut fixture = Fixture::new();
        fixture.add("first", "translate", 0);
        fixture.add("second", "translate", 0);
        let delegator = fixture.delegator();

        let result = delegator
            .delegate(DelegationRequest::new("caller", "translate", json!("hola")))
            .await;
        assert!(result.is_success());
        assert_eq!(result.output()["agent"], "first");

        let task_id = result.metadata()["task_id"].as_str().unwrap().to_string();
        let task = delegator.task(&task_id).unwrap();
        assert_eq!(task.state(), TaskState::Succeeded);
        assert_eq!(task.target_agent_id(), Some("first"));
    }

    #[tokio::test]
    async fn test_criteria_override_registration_order() {
        let mut fixture = Fixture::new();
        fixture.add("first", "translate", 0);
        fixture.add("second", "translate", 0);
        let delegator = fixture.delegator();

        let request = DelegationRequest::new("caller", "translate", json!(null))
            .with_criteria(|r| if r.id == "second" { 2.0 } else { 1.0 });
        let result = delegator.delegate(request).await;
        assert_eq!(result.output()["agent"], "second");
    }

    #[tokio::test]
    async fn test_no_matching_agent() {
        let fixture = Fixture::new();
        let delegator = fixture.delegator();

        let result = delegator
            .delegate(DelegationRequest::new("caller", "missing", json!(null)))
            .await;
        assert!(!result.is_success());
        assert_eq!(result.error_kind(), Some(ErrorKind::NoMatchingAgent));
        let task_id = result.metadata()["task_id"].as_str().unwrap().to_string();
        let task = delegator.task(&task_id).unwrap();
        assert_eq!(task.state(), TaskState::Failed);
        assert!(task.error.as_deref().unwrap().contains("missing"));

        let result = delegator
            .delegate(DelegationRequest::new("caller", "missing", json!(null)).to_agent("ghost"))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::AgentNotFound));
    }

    #[tokio::test]
    async fn test_prune_reclaims_finished_tasks() {
        let mut fixture = Fixture::new();
        fixture.add("worker", "work", 0);
        fixture.add("slow", "slow_work", 200);
        let delegator = Arc::new(fixture.delegator());

        for i in 0..20 {
            let result = delegator
                .delegate(DelegationRequest::new("caller", "work", json!(i)))
                .await;
            assert!(result.is_success());
        }
        delegator
            .delegate(DelegationRequest::new("caller", "missing", json!(null)))
            .await;
        assert_eq!(delegator.task_count(), 21);

        let background = delegator.clone();
        let in_flight = tokio::spawn(async move {
            background
                .delegate(DelegationRequest::new("caller", "slow_work", json!(null)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        // a generous age keeps everything
        assert_eq!(delegator.prune_terminal(Duration::from_secs(3600)), 0);
        assert_eq!(delegator.task_count(), 22);

        assert_eq!(delegator.prune_terminal(Duration::ZERO), 21);
        assert_eq!(delegator.task_count(), 1);

        let result = in_flight.await.unwrap();
        assert!(result.is_success());
        let task_id = result.metadata()["task_id"].as_str().unwrap().to_string();
        assert_eq!(delegator.task(&task_id).unwrap().state(), TaskState::Succeeded);
        assert_eq!(delegator.prune_terminal(Duration::ZERO), 1);
        assert_eq!(delegator.task_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_marks_task_timed_out() {
        let mut fixture = Fixture::new();
        fixture.add("slow", "work", 100);
        let delegator = fixture.delegator();

        let result = delegator
            .delegate(
                DelegationRequest::new("caller", "work", json!(null))
                    .to_agent("slow")
                    .with_timeout(Duration::from_millis(20)),
            )
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::TaskTimeout));

        let task_id = result.metadata()["task_id"].as_str().unwrap().to_string();
        assert_eq!(delegator.task(&task_id).unwrap().state(), TaskState::TimedOut);

        // the detached handler finishing later leaves the task as it was
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(delegator.task(&task_id).unwrap().state(), TaskState::TimedOut);
    }

    #[tokio::test]
    async fn test_parallel_results_follow_input_order() {
        let mut fixture = Fixture::new();
        fixture.add("slow", "slow_cap", 60);
        fixture.add("fast", "fast_cap", 5);
        let delegator = fixture.delegator();

        let results = delegator
            .delegate_parallel(vec![
                DelegationRequest::new("caller", "slow_cap", json!(1)),
                DelegationRequest::new("caller", "fast_cap", json!(2)),
            ])
            .await;
        assert_eq!(results[0].output()["agent"], "slow");
        assert_eq!(results[1].output()["agent"], "fast");
        // handler time travels back on the response
        assert!(results[0].metadata()["elapsed_ms"].as_u64().unwrap() >= 50);
    }
}
