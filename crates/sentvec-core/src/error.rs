use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend returned {actual} vectors for a batch of {expected} sentences")]
    BatchSize { expected: usize, actual: usize },

    #[error("Output directory already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("Malformed vectors on line {line}: {reason}")]
    MalformedVectors { line: usize, reason: String },

    #[error("Port already in use before server start: {0}")]
    PortInUse(String),

    #[error("Embedding server exited before accepting connections ({0})")]
    ServerExited(String),

    #[error("Embedding server at {addr} not ready after {timeout:?}")]
    StartupTimeout { addr: String, timeout: Duration },

    #[error("Backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
