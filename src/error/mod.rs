pub mod agent_error;

use std::io;

use thiserror::Error as ThisError;

pub use crate::error::agent_error::{AgentError, ErrorKind};

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serde_json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("agent error: {0}")]
    AgentError(#[from] AgentError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AgentError(e) => e.kind(),
            Error::TomlError(_) => ErrorKind::Configuration,
            Error::Io(_) | Error::SerdeJsonError(_) => ErrorKind::Internal,
        }
    }

    /// Message without the wrapping prefix, as surfaced in result objects.
    pub fn message(&self) -> String {
        match self {
            Error::AgentError(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<crate::model::ModelError> for Error {
    fn from(e: crate::model::ModelError) -> Self {
        Error::AgentError(AgentError::ModelInvocation(e))
    }
}

pub type Result<T> = core::result::Result<T, Error>;
