//! # Ephswarm Core
//!
//! Deterministic multi-agent navigation engine driven by expected free energy.
//!
//! Every step, each agent:
//! - builds an egocentric polar sensory grid (SPM) of its neighbours and obstacles
//! - scores a small set of candidate actions by goal, safety and epistemic cost
//! - estimates its own haze, which sets its precision for the next step
//!
//! and then all agents are integrated together from one snapshot.
//!
//! ## Architecture
//!
//! - **Snapshot discipline**: decisions read only the previous committed state;
//!   integration writes into a staging buffer that is swapped in as a batch.
//! - **Parallel processing**: Rayon over agents in both phases.
//! - **Deterministic simulation**: per-agent seeded ChaCha streams.
//! - **Pluggable predictive model**: any [`model::PredictiveModel`]; absent means zero uncertainty.
//!
//! ## Example
//!
//! ```
//! use ephswarm_core::config::SimConfig;
//! use ephswarm_core::world::World;
//! use ephswarm_data::{Agent, Goal, Vec2};
//!
//! let agents = vec![Agent::new(0, Vec2::new(10.0, 10.0), Goal::Point { at: Vec2::new(20.0, 10.0) })];
//! let mut world = World::new(SimConfig::default(), agents, vec![], None).unwrap();
//! let report = world.step().unwrap();
//! assert_eq!(report.observations.len(), 1);
//! ```

/// Contact detection and nearest threats
pub mod collision;
/// Configuration management for simulation parameters
pub mod config;
/// Expected-free-energy action selection and emergency overrides
pub mod controller;
/// Update laws, boundary handling and obstacle push-out
pub mod dynamics;
pub mod error;
/// Arena topology and egocentric frames
pub mod geometry;
/// Self-haze and precision
pub mod haze;
/// Performance metrics collection and logging
pub mod metrics;
/// Predictive model seam and built-in models
pub mod model;
pub mod observation;
pub mod obstacles;
/// Spatial hashing for radius queries
pub mod spatial_hash;
/// Egocentric polar sensory grid
pub mod spm;
/// World state and the two-phase step
pub mod world;

pub use error::{Result, SimError};
