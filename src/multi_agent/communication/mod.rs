pub mod message;
pub mod transport;

pub use message::{TaskMessage, TaskResponse};
pub use transport::{InProcessTransport, TaskTransport};
