use std::{sync::Arc, time::Duration};

use rusorchestra::{
    agent::{AgentBehavior, AgentCapability, LlmAgent, handler_fn},
    config::OrchestratorConfig,
    model::{ModelResponse, ScriptedModelClient},
    multi_agent::{
        AgentCollaboration, AgentManager, AgentRegistry, CollaborationStrategy,
        DelegationRequest, InProcessTransport, TaskDelegator, VotingMethod,
    },
    telemetry,
    tools::ToolRegistry,
    workflow::{Predicate, Workflow, WorkflowConfig, WorkflowNode},
};
use serde_json::json;

fn scripted_agent(config: &OrchestratorConfig, name: &str, answer: &str) -> LlmAgent {
    let model = Arc::new(
        ScriptedModelClient::repeating(ModelResponse::final_text(answer))
            .with_latency(Duration::from_millis(20)),
    );
    LlmAgent::new(
        config.agent_config(name, "scripted"),
        model,
        Arc::new(ToolRegistry::new()),
    )
    .with_id(name)
}

#[tokio::main]
async fn main() -> rusorchestra::Result<()> {
    let config = OrchestratorConfig::default().with_env_overrides();
    telemetry::init_tracing(&config.logging);

    // 1. workflow: draft, review, then branch on the verdict
    let drafter: Arc<dyn AgentBehavior> =
        Arc::new(scripted_agent(&config, "drafter", "a short draft"));
    let reviewer: Arc<dyn AgentBehavior> =
        Arc::new(scripted_agent(&config, "reviewer", "APPROVED"));
    let publisher: Arc<dyn AgentBehavior> =
        Arc::new(scripted_agent(&config, "publisher", "published"));

    let graph = WorkflowConfig::new("publish", "draft")
        .with_description("draft, review and publish")
        .with_node(WorkflowNode::agent("draft", "drafter").with_next(&["review"]))
        .with_node(WorkflowNode::agent("review", "reviewer").with_next(&["gate"]))
        .with_node(WorkflowNode::condition(
            "gate",
            Predicate::output_contains("APPROVED"),
            "publish",
            "draft",
        ))
        .with_node(WorkflowNode::agent("publish", "publisher"));
    let workflow = Workflow::new(
        graph,
        config.workflow_settings(),
        vec![drafter, reviewer, publisher],
    )?;
    let result = workflow.run(json!("write release notes")).await;
    println!("workflow: success={} visited={:?}", result.success, result.visited);

    // 2. delegation through the registry
    let registry = Arc::new(AgentRegistry::new(config.registry_config()));
    let transport = Arc::new(InProcessTransport::new());
    let manager = AgentManager::new(
        registry.clone(),
        transport.clone(),
        config.heartbeat_interval(),
    );

    let translator = scripted_agent(&config, "translator", "unused").with_capability_handler(
        AgentCapability::new("translate", "translates text").with_tags(&["language"]),
        handler_fn(|input| async move { Ok(json!({ "translated": input })) }),
    );
    manager.spawn_agent(Arc::new(translator)).await?;

    let delegator = TaskDelegator::new(registry, transport, config.delegation_config());
    let delegated = delegator
        .delegate(DelegationRequest::new("demo", "translate", json!("hola")))
        .await;
    println!("delegation: {}", delegated.output());

    // 3. weighted consensus
    let panel = AgentCollaboration::new(CollaborationStrategy::Consensus)
        .with_voting(VotingMethod::Weighted)
        .with_weighted_agent(Arc::new(scripted_agent(&config, "junior_1", "ship")), 1.0)
        .with_weighted_agent(Arc::new(scripted_agent(&config, "junior_2", "ship")), 1.0)
        .with_weighted_agent(Arc::new(scripted_agent(&config, "lead", "wait")), 3.0);
    let verdict = panel.execute("ship today?").await;
    println!("consensus: {:?}", verdict.choice());

    manager.shutdown_all().await?;
    Ok(())
}
