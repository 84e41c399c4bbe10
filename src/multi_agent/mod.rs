pub mod collaboration;
pub mod communication;
pub mod coordination;
pub mod discovery;
pub mod manager;
pub mod registry;

pub use collaboration::{
    AgentCollaboration, CollaborationDecision, CollaborationResult, CollaborationStrategy,
    VotingMethod,
};
pub use communication::{InProcessTransport, TaskMessage, TaskResponse, TaskTransport};
pub use coordination::{DelegationConfig, DelegationRequest, Task, TaskDelegator, TaskState};
pub use discovery::AgentDiscovery;
pub use manager::AgentManager;
pub use registry::{AgentRecord, AgentRegistry, RegistryConfig};
