#[cfg(test)]
mod orchestration_tests {
    use std::{sync::Arc, time::Duration};

    use rusorchestra::{
        ErrorKind,
        agent::{AgentBehavior, AgentCapability, AgentConfig, LlmAgent, handler_fn},
        model::{ModelResponse, ScriptedModelClient, ToolInvocation},
        multi_agent::{
            AgentCollaboration, AgentDiscovery, AgentManager, AgentRecord, AgentRegistry,
            CollaborationStrategy, DelegationConfig, DelegationRequest, InProcessTransport,
            RegistryConfig, TaskDelegator, TaskState, VotingMethod,
        },
        shared::SharedState,
        tools::{ToolInfo, ToolRegistry, tool_fn},
        workflow::{Workflow, WorkflowConfig, WorkflowNode, WorkflowSettings},
    };
    use serde_json::json;

    fn voter(id: &str, answer: &str, latency_ms: u64) -> Arc<dyn AgentBehavior> {
        let model = Arc::new(
            ScriptedModelClient::repeating(ModelResponse::final_text(answer))
                .with_latency(Duration::from_millis(latency_ms)),
        );
        Arc::new(
            LlmAgent::new(
                AgentConfig::new(id, "test-model").with_memory(false, 0),
                model,
                Arc::new(ToolRegistry::new()),
            )
            .with_id(id),
        )
    }

    fn worker(id: &str, capability: &str, delay_ms: u64) -> Arc<dyn AgentBehavior> {
        let model = Arc::new(ScriptedModelClient::repeating(ModelResponse::final_text("unused")));
        Arc::new(
            LlmAgent::new(
                AgentConfig::new(id, "test-model"),
                model,
                Arc::new(ToolRegistry::new()),
            )
            .with_id(id)
            .with_capability_handler(
                AgentCapability::new(capability, "sleeps then echoes"),
                handler_fn(move |input| async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(json!({ "echo": input }))
                }),
            ),
        )
    }

    #[tokio::test]
    async fn test_delegation_deadline() {
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
        let transport = Arc::new(InProcessTransport::new());
        let manager = AgentManager::new(
            registry.clone(),
            transport.clone(),
            Duration::from_secs(1),
        );
        manager.spawn_agent(worker("quick", "quick_job", 10)).await.unwrap();
        manager.spawn_agent(worker("sluggish", "slow_job", 100)).await.unwrap();

        let delegator = TaskDelegator::new(registry, transport, DelegationConfig::default());
        let deadline = Duration::from_millis(50);

        let fast = delegator
            .delegate(
                DelegationRequest::new("tester", "quick_job", json!("ping")).with_timeout(deadline),
            )
            .await;
        assert!(fast.is_success());
        assert_eq!(fast.output(), &json!({ "echo": "ping" }));

        let slow = delegator
            .delegate(
                DelegationRequest::new("tester", "slow_job", json!("ping")).with_timeout(deadline),
            )
            .await;
        assert!(!slow.is_success());
        assert_eq!(slow.error_kind(), Some(ErrorKind::TaskTimeout));

        let task_id = slow.metadata()["task_id"].as_str().unwrap();
        assert_eq!(delegator.task(task_id).unwrap().state(), TaskState::TimedOut);

        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_consensus_voting_methods() {
        let agents = || {
            vec![
                voter("agent1", "A", 0),
                voter("agent2", "A", 0),
                voter("agent3", "B", 0),
            ]
        };

        let mut majority = AgentCollaboration::new(CollaborationStrategy::Consensus)
            .with_voting(VotingMethod::Majority);
        for agent in agents() {
            majority = majority.with_agent(agent);
        }
        let result = majority.execute("pick one").await;
        assert!(result.success);
        assert_eq!(result.choice(), Some("A"));

        let mut unanimous = AgentCollaboration::new(CollaborationStrategy::Consensus)
            .with_voting(VotingMethod::Unanimous);
        for agent in agents() {
            unanimous = unanimous.with_agent(agent);
        }
        let result = unanimous.execute("pick one").await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::NoConsensus));

        let weights = [1.0, 1.0, 5.0];
        let mut weighted = AgentCollaboration::new(CollaborationStrategy::Consensus)
            .with_voting(VotingMethod::Weighted);
        for (agent, weight) in agents().into_iter().zip(weights) {
            weighted = weighted.with_weighted_agent(agent, weight);
        }
        let result = weighted.execute("pick one").await;
        assert!(result.success);
        assert_eq!(result.choice(), Some("B"));
    }

    #[tokio::test]
    async fn test_parallel_collaboration_keeps_input_order() {
        let collaboration = AgentCollaboration::new(CollaborationStrategy::Parallel)
            .with_agent(voter("slow", "first", 60))
            .with_agent(voter("medium", "second", 30))
            .with_agent(voter("fast", "third", 1));

        let result = collaboration.execute("go").await;
        assert!(result.success);
        let outputs: Vec<String> = result
            .results
            .iter()
            .map(|r| r.result.output_text())
            .collect();
        assert_eq!(outputs, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_parallel_workflow_merges_branch_writes() {
        let agents = vec![
            voter("writer_one", "one", 5),
            voter("writer_two", "two", 5),
            voter("early", "from early branch", 10),
            voter("late", "from late branch", 80),
        ];
        let config = WorkflowConfig::new("fan_out", "split")
            .with_node(WorkflowNode::parallel("split", &["left", "right"]))
            .with_node(
                WorkflowNode::agent("left", "writer_one")
                    .with_output_key("k1")
                    .with_next(&["left_shared"]),
            )
            .with_node(
                WorkflowNode::agent("right", "writer_two")
                    .with_output_key("k2")
                    .with_next(&["right_shared"]),
            )
            .with_node(WorkflowNode::agent("left_shared", "late").with_output_key("k3"))
            .with_node(WorkflowNode::agent("right_shared", "early").with_output_key("k3"));
        let workflow = Workflow::new(config, WorkflowSettings::default(), agents).unwrap();

        let state = SharedState::new();
        let result = workflow.run_with_state(json!("start"), state.clone()).await;
        assert!(result.success, "{:?}", result.error);

        assert_eq!(state.get("k1"), Some(json!("one")));
        assert_eq!(state.get("k2"), Some(json!("two")));
        assert_eq!(state.get("k3"), Some(json!("from late branch")));
        assert_eq!(result.state["k3"], json!("from late branch"));
    }

    #[tokio::test]
    async fn test_reregistration_and_discovery() {
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
        let caps = |names: &[&str]| {
            names
                .iter()
                .map(|n| AgentCapability::new(n, "capability"))
                .collect::<Vec<_>>()
        };

        registry
            .register(AgentRecord::new("solo", "solo", caps(&["A"])))
            .unwrap();
        registry
            .register(AgentRecord::new("duo", "duo", caps(&["A", "B"])))
            .unwrap();
        registry
            .register(AgentRecord::new("solo", "solo", caps(&["A", "C"])))
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("solo").unwrap().has_capability("C"));

        let discovery = AgentDiscovery::new(registry.clone());
        let matched: Vec<String> = discovery
            .discover(&["A", "B"])
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(matched, vec!["duo"]);

        let stats = registry.stats();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.available_agents, 2);
    }

    #[tokio::test]
    async fn test_agent_uses_tools_and_remembers() {
        let mut tools = ToolRegistry::new();
        tools
            .register(tool_fn(
                ToolInfo::new(
                    "add",
                    "adds two numbers",
                    json!({
                        "type": "object",
                        "properties": { "a": {"type": "number"}, "b": {"type": "number"} },
                        "required": ["a", "b"]
                    }),
                ),
                |args| async move {
                    let a = args["a"].as_f64().unwrap_or_default();
                    let b = args["b"].as_f64().unwrap_or_default();
                    Ok(json!(a + b))
                },
            ))
            .unwrap();

        let model = Arc::new(ScriptedModelClient::new(vec![
            ModelResponse::tool_calls(vec![ToolInvocation::new("add", json!({"a": 2, "b": 3}))]),
            ModelResponse::final_text("5"),
            ModelResponse::final_text("still 5"),
        ]));
        let agent = LlmAgent::new(
            AgentConfig::new("calculator", "test-model").with_tools(&["add"]),
            model.clone(),
            Arc::new(tools),
        );

        let first = agent.execute("what is 2 + 3?").await;
        assert!(first.is_success());
        assert_eq!(first.output_text(), "5");
        assert_eq!(first.tool_calls().len(), 1);
        assert_eq!(first.tool_calls()[0].result, Some(json!(5.0)));
        assert_eq!(first.iterations(), 2);

        let second = agent.execute("and again?").await;
        assert_eq!(second.output_text(), "still 5");
        let calls = model.calls().await;
        assert!(calls[2].messages.len() > calls[0].messages.len());
    }
}
