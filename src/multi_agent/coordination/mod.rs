pub mod delegation;
pub mod task;

pub use delegation::{DelegationConfig, DelegationRequest, ScoreFn, TaskDelegator};
pub use task::{Task, TaskState};
