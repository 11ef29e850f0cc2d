//! # ms-sim
//!
//! Synthetic serving endpoint for exercising ModelSweep searches without a
//! real inference server or profiler.

mod endpoint;
mod runner;

pub use endpoint::{EndpointModel, SyntheticEndpoint};
pub use runner::{run_search, SearchReport, SimConfig};
