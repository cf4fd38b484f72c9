use thiserror::Error;

use pwrlvl_core::{ProcessError, RegistryError, StateError};

#[derive(Debug, Error)]
pub enum OperationError {
    /// The operation is running or still tearing down.
    #[error("already running")]
    AlreadyRunning,

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{} not found", tools.join("/"))]
    ToolMissing { tools: Vec<String> },

    #[error("{0}")]
    ProcessFailure(String),

    #[error(transparent)]
    Spawn(#[from] ProcessError),

    /// The routine observed a stop request. Not reported as a failure.
    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StateError> for OperationError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::UnknownOperation(name) => OperationError::UnknownOperation(name),
            StateError::Busy { .. } => OperationError::AlreadyRunning,
        }
    }
}

impl From<RegistryError> for OperationError {
    fn from(err: RegistryError) -> Self {
        OperationError::ProcessFailure(err.to_string())
    }
}
