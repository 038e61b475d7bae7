//! # Ephswarm IO
//!
//! Everything that touches files for the simulation:
//! - Scenario loading (TOML/JSON) and generators for the standard experiments
//! - Predictive-model artifact loading
//! - Trajectory recording as (optionally gzipped) JSON lines
//! - Structured error handling with custom error types

/// Error types and result aliases for I/O operations
pub mod error;
/// Seeded scenario generators
pub mod generators;
/// Predictive model artifacts
pub mod model_artifact;
/// JSON-lines trajectory recorder
pub mod recorder;
/// Scenario files
pub mod scenario;

pub use error::{IoError, Result};
pub use model_artifact::load_model;
pub use recorder::{read_records, Record, RunHeader, TrajectoryRecorder};
pub use scenario::Scenario;
