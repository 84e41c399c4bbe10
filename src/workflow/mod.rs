pub mod engine;
pub mod human;
pub mod node;

pub use engine::{NodeResult, Workflow, WorkflowConfig, WorkflowResult, WorkflowSettings};
pub use human::{HumanInputHandler, human_fn};
pub use node::{NodeKind, Predicate, PredicateContext, WorkflowNode};
