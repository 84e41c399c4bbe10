use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Supplies the value for a HUMAN_IN_LOOP node. May block for as long as
/// the person takes unless the workflow is configured with a timeout.
#[async_trait]
pub trait HumanInputHandler: Send + Sync {
    async fn request_input(&self, prompt: &str) -> Result<Value>;
}

pub struct FnHumanHandler<F>(F);

#[async_trait]
impl<F, Fut> HumanInputHandler for FnHumanHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn request_input(&self, prompt: &str) -> Result<Value> {
        (self.0)(prompt.to_string()).await
    }
}

pub fn human_fn<F, Fut>(func: F) -> Arc<dyn HumanInputHandler>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHumanHandler(func))
}
