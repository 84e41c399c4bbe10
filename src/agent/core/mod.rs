pub mod agent;
pub mod base_agent;

pub use agent::LlmAgent;
pub use base_agent::{AgentBehavior, BaseAgent, CapabilityHandler, handler_fn};
