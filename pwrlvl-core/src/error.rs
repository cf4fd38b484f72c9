use std::path::PathBuf;

use thiserror::Error;

use crate::state::Phase;

/// Process registry misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a process is already registered under '{0}'")]
    Occupied(String),
}

/// Rejected state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("operation '{name}' is {phase}")]
    Busy { name: String, phase: Phase },
}

/// External process launch failures.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}
