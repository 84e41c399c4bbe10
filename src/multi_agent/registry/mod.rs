pub mod agent_registry;

pub use agent_registry::{AgentRecord, AgentRegistry, RegistryConfig, RegistryStats};
