pub mod model;
pub mod registry;

pub use model::ToolInfo;
pub use registry::{FnTool, Tool, ToolRegistry, ToolResult, tool_fn};
