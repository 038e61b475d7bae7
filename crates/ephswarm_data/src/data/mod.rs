//! Core data structures for the ephswarm simulation.

pub mod agent;
pub mod obstacle;
pub mod vector;
