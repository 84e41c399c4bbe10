pub mod agent_manager;

pub use agent_manager::AgentManager;
