//! Headless runner for the ephswarm navigation simulation.
//!
//! The engine lives in `ephswarm_core`, plain data in `ephswarm_data` and
//! file handling in `ephswarm_io`; this crate wires them into a CLI.

pub mod runner;

pub use ephswarm_core;
pub use ephswarm_data;
pub use ephswarm_io;
