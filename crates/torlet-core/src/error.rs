//! Error types for torlet

use thiserror::Error;

/// Main error type for torlet
#[derive(Error, Debug)]
pub enum TorletError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Instance lookup by name or index missed
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Creation requested with a name the pool already holds
    #[error("Instance name already in use: {0}")]
    DuplicateName(String),

    /// The instance daemon failed to reach readiness
    #[error("Instance startup failed: {0}")]
    Startup(String),

    /// Control-protocol error
    #[error("Control protocol error: {0}")]
    Control(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// One or more sub-operations of a parallel batch failed
    #[error("Batch operation failed ({failed}/{total} sub-operations): {first}")]
    Batch {
        failed: usize,
        total: usize,
        first: Box<TorletError>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for torlet operations
pub type TorletResult<T> = Result<T, TorletError>;

impl TorletError {
    /// Collapse the failures of a settled batch into a single error.
    ///
    /// Returns `None` when no sub-operation failed. The first failure is kept
    /// as the representative cause; no partial-success report is produced.
    pub fn from_batch(errors: Vec<TorletError>, total: usize) -> Option<TorletError> {
        let failed = errors.len();
        errors.into_iter().next().map(|first| TorletError::Batch {
            failed,
            total,
            first: Box::new(first),
        })
    }
}

impl From<toml::de::Error> for TorletError {
    fn from(err: toml::de::Error) -> Self {
        TorletError::Config(err.to_string())
    }
}
