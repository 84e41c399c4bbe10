use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    message::ChatMessage,
    model::{ModelClient, ModelError, ModelResponse},
    tools::ToolInfo,
};

/// A [`ModelClient`] that replays a fixed script of responses.
///
/// Once the queue is drained the fallback response is returned for every
/// further call; without a fallback the client reports an invalid response.
#[derive(Debug, Default)]
pub struct ScriptedModelClient {
    script: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    fallback: Option<Result<ModelResponse, ModelError>>,
    latency: Option<Duration>,
    received: Mutex<Vec<ScriptedCall>>,
}

/// What the scripted client saw on one invocation.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

impl ScriptedModelClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// Always answers with `response`.
    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            fallback: Some(Ok(response)),
            ..Default::default()
        }
    }

    /// Always fails with `error`.
    pub fn failing(error: ModelError) -> Self {
        Self {
            fallback: Some(Err(error)),
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(Ok(response));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn push(&self, response: Result<ModelResponse, ModelError>) {
        self.script.lock().await.push_back(response);
    }

    pub async fn calls(&self) -> Vec<ScriptedCall> {
        self.received.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.received.lock().await.len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolInfo],
    ) -> Result<ModelResponse, ModelError> {
        self.received.lock().await.push(ScriptedCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().await.pop_front();
        match next {
            Some(response) => response,
            None => self.fallback.clone().unwrap_or_else(|| {
                Err(ModelError::InvalidResponse("script exhausted".into()))
            }),
        }
    }
}
