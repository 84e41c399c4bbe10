pub mod llm;

pub use llm::{ChatMessage, Role};
