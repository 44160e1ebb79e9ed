//! Error types for gravsim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid body: {0}")]
    InvalidBody(String),

    #[error("Dimension mismatch: expected {expected} components, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
