//! Error types for the simulation harness.

use thiserror::Error;
use treasury_core::{ConfigError, EngineError};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),
}
