use std::io;

use thiserror::Error;

use pwrlvl_config::ConfigError;
use pwrlvl_telemetry::MetricsError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("server error: {0}")]
    Io(#[from] io::Error),
}
