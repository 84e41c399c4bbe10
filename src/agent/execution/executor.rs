use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    agent::{
        execution::{ExecutionResult, ToolCallRecord},
        types::AgentConfig,
    },
    error::{AgentError, Error, ErrorKind},
    message::ChatMessage,
    model::{ModelClient, ModelResponse, ToolInvocation},
    tools::ToolRegistry,
};

/// Drives one agent through the bounded reason/act cycle.
///
/// The executor keeps no state between runs; the caller owns the history.
#[derive(Clone)]
pub struct Executor {
    model: Arc<dyn ModelClient>,
}

impl Executor {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// Runs the loop once, appending every turn to `history`.
    ///
    /// Tool failures are recorded in the trace and shown to the model; only
    /// a model-service failure or the iteration ceiling ends the run early.
    pub async fn run(
        &self,
        config: &AgentConfig,
        tools: &ToolRegistry,
        input: &str,
        history: &mut Vec<ChatMessage>,
    ) -> ExecutionResult {
        let started = Instant::now();

        if !config.system_prompt.is_empty() && !history.iter().any(|m| m.is_system()) {
            history.insert(0, ChatMessage::system(&config.system_prompt));
        }
        history.push(ChatMessage::user(input));

        let schemas = tools.schemas_for(&config.tools);
        let mut trace: Vec<ToolCallRecord> = Vec::new();
        let mut partial: Option<String> = None;
        let mut iteration = 0;

        while iteration < config.max_iterations {
            iteration += 1;
            debug!(
                "Agent {} iteration {}/{}",
                config.name, iteration, config.max_iterations
            );

            let response = match self.model.invoke(&config.model, history, &schemas).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Agent {} model invocation failed: {}", config.name, e);
                    let result = ExecutionResult::failure(
                        ErrorKind::ModelInvocation,
                        e.to_string(),
                        partial_output(&partial),
                        iteration,
                        trace,
                    );
                    return finish(result, config, started);
                }
            };

            let (content, calls) = match response {
                ModelResponse::Final(text) => (Some(text), Vec::new()),
                ModelResponse::ToolCalls { content, calls } => (content, calls),
            };

            if calls.is_empty() {
                let answer = content.unwrap_or_default();
                history.push(ChatMessage::assistant(&answer));
                info!(
                    "Agent {} finished after {} iteration(s)",
                    config.name, iteration
                );
                let result = ExecutionResult::success(Value::String(answer), iteration, trace);
                return finish(result, config, started);
            }

            if content.is_some() {
                partial = content.clone();
            }
            history.push(ChatMessage::assistant_tool_calls(content, calls.clone()));

            let records = dispatch(config, tools, &calls).await;
            for record in &records {
                history.push(ChatMessage::tool(&record.id, &record.name, record.observation()));
            }
            trace.extend(records);
        }

        warn!(
            "Agent {} reached max iterations ({})",
            config.name, config.max_iterations
        );
        let error = AgentError::MaxIterationsExceeded;
        let result = ExecutionResult::failure(
            error.kind(),
            error.to_string(),
            partial_output(&partial),
            iteration,
            trace,
        );
        finish(result, config, started)
    }
}

fn partial_output(partial: &Option<String>) -> Value {
    partial.clone().map(Value::String).unwrap_or(Value::Null)
}

fn finish(result: ExecutionResult, config: &AgentConfig, started: Instant) -> ExecutionResult {
    result
        .with_metadata("agent", json!(config.name))
        .with_metadata("model", json!(config.model))
        .with_metadata("elapsed_ms", json!(started.elapsed().as_millis() as u64))
}

/// Dispatches one step's invocations concurrently; records keep issuance order.
async fn dispatch(
    config: &AgentConfig,
    tools: &ToolRegistry,
    calls: &[ToolInvocation],
) -> Vec<ToolCallRecord> {
    let pending = calls.iter().map(|call| {
        let prepared = if config.allows_tool(&call.name) {
            tools.prepare(&call.name, &call.arguments)
        } else {
            Err(Error::AgentError(AgentError::ToolExecution {
                tool: call.name.clone(),
                reason: "tool not available to this agent".into(),
            }))
        };
        let call = call.clone();

        async move {
            let started = Instant::now();
            let tool = match prepared {
                Ok(tool) => tool,
                Err(e) => {
                    debug!("Tool call {} rejected: {}", call.name, e.message());
                    return ToolCallRecord::failed(&call, e.kind(), e.message(), 0);
                }
            };

            let arguments = call.arguments.clone();
            let outcome = tokio::spawn(async move { tool.call(arguments).await }).await;
            let elapsed = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(output)) => ToolCallRecord::succeeded(&call, output, elapsed),
                Ok(Err(e)) => {
                    ToolCallRecord::failed(&call, ErrorKind::ToolExecution, e.message(), elapsed)
                }
                Err(e) => ToolCallRecord::failed(
                    &call,
                    ErrorKind::Internal,
                    format!("tool '{}' panicked: {}", call.name, e),
                    elapsed,
                ),
            }
        }
    });

    join_all(pending).await
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use serde_json::json;

    use super::*;
    use crate::{
        model::{ModelError, ScriptedModelClient},
        tools::{ToolInfo, tool_fn},
    };

    fn sleepy_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for (name, delay) in [("slow", 60u64), ("medium", 30), ("fast", 5)] {
            registry
                .register(tool_fn(
                    ToolInfo::new(name, "sleeps then answers", json!({"type": "object"})),
                    move |_args: Value| async move {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        Ok(json!(name))
                    },
                ))
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_final_answer_on_first_iteration() {
        let model = Arc::new(ScriptedModelClient::new(vec![ModelResponse::final_text("42")]));
        let executor = Executor::new(model.clone());
        let config = AgentConfig::new("solver", "test-model").with_system_prompt("math");
        let mut history = Vec::new();

        let result = executor
            .run(&config, &ToolRegistry::new(), "6 * 7?", &mut history)
            .await;

        assert!(result.is_success());
        assert_eq!(result.output_text(), "42");
        assert_eq!(result.iterations(), 1);
        assert!(history[0].is_system());
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_max_iterations_exceeded() {
        for max in [1u32, 3, 5] {
            let model = Arc::new(ScriptedModelClient::repeating(ModelResponse::ToolCalls {
                content: Some("still thinking".into()),
                calls: vec![ToolInvocation::new("fast", json!({}))],
            }));
            let executor = Executor::new(model.clone());
            let config = AgentConfig::new("looper", "m")
                .with_tools(&["fast"])
                .with_max_iterations(max);
            let mut history = Vec::new();

            let result = executor
                .run(&config, &sleepy_registry(), "go", &mut history)
                .await;

            assert!(!result.is_success());
            assert_eq!(result.error_kind(), Some(ErrorKind::MaxIterationsExceeded));
            assert_eq!(result.error_message(), Some("max iterations exceeded"));
            assert_eq!(result.iterations(), max);
            assert_eq!(result.tool_calls().len(), max as usize);
            assert_eq!(result.output_text(), "still thinking");
            assert_eq!(model.call_count().await, max as usize);
        }
    }

    #[tokio::test]
    async fn test_tool_trace_follows_issuance_order() {
        let model = Arc::new(ScriptedModelClient::new(vec![
            ModelResponse::tool_calls(vec![
                ToolInvocation::new("slow", json!({})),
                ToolInvocation::new("medium", json!({})),
                ToolInvocation::new("fast", json!({})),
            ]),
            ModelResponse::final_text("done"),
        ]));
        let executor = Executor::new(model);
        let config = AgentConfig::new("ordered", "m").with_tools(&["slow", "medium", "fast"]);
        let mut history = Vec::new();

        let result = executor
            .run(&config, &sleepy_registry(), "go", &mut history)
            .await;

        assert!(result.is_success());
        let names: Vec<&str> = result.tool_calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "medium", "fast"]);
        assert!(result.tool_calls().iter().all(|c| c.success));
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_loop() {
        let mut registry = ToolRegistry::new();
        registry
            .register(tool_fn(
                ToolInfo::new("broken", "always fails", json!({})),
                |_args: Value| async move {
                    Err(Error::AgentError(AgentError::Internal("disk on fire".into())))
                },
            ))
            .unwrap();
        let model = Arc::new(ScriptedModelClient::new(vec![
            ModelResponse::tool_calls(vec![
                ToolInvocation::new("broken", json!({})),
                ToolInvocation::new("not_allowed", json!({})),
            ]),
            ModelResponse::final_text("recovered"),
        ]));
        let executor = Executor::new(model.clone());
        let config = AgentConfig::new("resilient", "m").with_tools(&["broken"]);
        let mut history = Vec::new();

        let result = executor.run(&config, &registry, "go", &mut history).await;

        assert!(result.is_success());
        assert_eq!(result.output_text(), "recovered");
        let calls = result.tool_calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].success);
        assert_eq!(calls[0].error_kind, Some(ErrorKind::ToolExecution));
        assert!(calls[0].error.as_deref().unwrap().contains("disk on fire"));
        assert!(!calls[1].success);

        let second_call = &model.calls().await[1];
        assert!(
            second_call
                .messages
                .iter()
                .any(|m| m.text().contains("disk on fire"))
        );
    }

    #[tokio::test]
    async fn test_panic_and_schema_mismatch_become_failed_records() {
        let typed_ran = Arc::new(AtomicBool::new(false));
        let mut registry = ToolRegistry::new();
        registry
            .register(tool_fn(
                ToolInfo::new("boom", "panics", json!({"type": "object"})),
                |args: Value| async move {
                    if args.get("safe").is_none() {
                        panic!("tool body exploded");
                    }
                    Ok(json!("unreachable"))
                },
            ))
            .unwrap();
        let flag = typed_ran.clone();
        registry
            .register(tool_fn(
                ToolInfo::new(
                    "typed",
                    "needs n",
                    json!({
                        "type": "object",
                        "properties": {"n": {"type": "integer"}},
                        "required": ["n"]
                    }),
                ),
                move |args: Value| {
                    let flag = flag.clone();
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(args)
                    }
                },
            ))
            .unwrap();
        let model = Arc::new(ScriptedModelClient::new(vec![
            ModelResponse::tool_calls(vec![
                ToolInvocation::new("boom", json!({})),
                ToolInvocation::new("typed", json!({})),
            ]),
            ModelResponse::final_text("carried on"),
        ]));
        let executor = Executor::new(model);
        let config = AgentConfig::new("sturdy", "m").with_tools(&["boom", "typed"]);
        let mut history = Vec::new();

        let result = executor.run(&config, &registry, "go", &mut history).await;

        assert!(result.is_success());
        assert_eq!(result.output_text(), "carried on");
        let kinds: Vec<Option<ErrorKind>> =
            result.tool_calls().iter().map(|c| c.error_kind).collect();
        assert_eq!(kinds, vec![Some(ErrorKind::Internal), Some(ErrorKind::ToolSchema)]);
        assert!(result.tool_calls().iter().all(|c| !c.success));
        assert!(!typed_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_model_error_surfaces_unmodified() {
        let model = Arc::new(ScriptedModelClient::failing(ModelError::RateLimited(
            "slow down".into(),
        )));
        let executor = Executor::new(model);
        let config = AgentConfig::new("limited", "m");
        let mut history = Vec::new();

        let result = executor
            .run(&config, &ToolRegistry::new(), "hello", &mut history)
            .await;

        assert!(!result.is_success());
        assert_eq!(result.error_kind(), Some(ErrorKind::ModelInvocation));
        assert_eq!(
            result.error_message(),
            Some(ModelError::RateLimited("slow down".into()).to_string().as_str())
        );
        assert_eq!(result.iterations(), 1);
    }
}
