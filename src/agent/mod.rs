pub mod core;
pub mod execution;
pub mod memory;
pub mod types;

pub use self::core::{AgentBehavior, BaseAgent, CapabilityHandler, LlmAgent, handler_fn};
pub use execution::{ExecutionResult, Executor, ToolCallRecord};
pub use memory::ConversationMemory;
pub use types::{AgentCapability, AgentConfig, AgentStatus};
