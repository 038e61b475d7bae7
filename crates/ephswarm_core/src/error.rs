//! Error types for the simulation core.
//!
//! Configuration problems and numerical invariant violations are fatal and
//! surface as [`SimError`]. Predictive-model failures are recoverable and use
//! [`crate::model::ModelError`] instead.

use ephswarm_data::AgentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// Rejected before any step runs.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A position or velocity stopped being finite.
    #[error("Non-finite {quantity} for {agent} at step {step}: {value}")]
    NonFinite {
        agent: AgentId,
        step: u64,
        quantity: &'static str,
        value: f64,
    },

    #[error("Empty candidate set for {agent}")]
    EmptyCandidateSet { agent: AgentId },

    /// Agent ids must match their arena slot.
    #[error("Agent at slot {slot} carries id {found}")]
    AgentSlot { slot: usize, found: AgentId },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    #[must_use]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// True for conditions detected at initialization.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ConfigParse(_) | Self::AgentSlot { .. })
    }
}

/// Returns early with [`SimError::Config`] when the condition is false.
#[macro_export]
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::error::SimError::Config(format!($($arg)+)));
        }
    };
}
