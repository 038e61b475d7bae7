//! Errors raised while reading scenarios and model artifacts or writing trajectories.
//!
//! Failures the core raises while a world is being built are wrapped in
//! [`IoError::Sim`] instead of being flattened into strings.

use ephswarm_core::SimError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The core rejected the configuration or initial state.
    #[error("Simulation error: {0}")]
    Sim(#[from] SimError),

    #[error("Compression error: {0}")]
    Compression(String),

    /// A scenario or generator request that cannot describe a valid run.
    #[error("Invalid scenario: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<IoError>,
    },
}

pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    #[must_use]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    #[must_use]
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound(resource.into())
    }

    #[must_use]
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Prefixes the message with where the failure happened.
    #[must_use]
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the root cause is a configuration rejected by the core.
    #[must_use]
    pub fn is_config(&self) -> bool {
        match self {
            Self::Sim(e) => e.is_config(),
            Self::Context { source, .. } => source.is_config(),
            _ => false,
        }
    }
}
