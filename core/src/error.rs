//! Error types for the SLAM toolbox
//!
//! Only construction, logger setup and I/O can fail. Once a grid and an engine exist, the per-cycle operations
//! degrade gracefully (skipped cells, uniform fallback weights) instead of returning errors.
use thiserror::Error;

/// Errors raised while building grids, engines and configurations, or while exporting results.
#[derive(Error, Debug)]
pub enum SlamError {
    #[error("Invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Particle filter needs at least one particle, got {0}")]
    InvalidParticleCount(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Log-odds buffer does not match grid layout: expected {expected} cells, got {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Logger error: {0}")]
    Logger(#[from] log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, SlamError>;
