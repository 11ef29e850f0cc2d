//! Core types, configuration and errors shared by the ModelSweep crates.

pub mod config;
pub mod coordinate;
pub mod dimension;
pub mod errors;
pub mod measurement;
pub mod run_config;

pub use config::*;
pub use coordinate::*;
pub use dimension::*;
pub use errors::*;
pub use measurement::*;
pub use run_config::*;
