pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod multi_agent;
pub mod shared;
pub mod telemetry;
pub mod tools;
pub mod workflow;

pub use error::{Error, ErrorKind, Result};
