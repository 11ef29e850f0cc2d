//! # ms-search
//!
//! Search strategies that choose which serving configuration to profile
//! next for ModelSweep.
//!
//! Provides the neighborhood hill climber, the pull-based generator
//! protocol with its `Chain` combinator, the concurrency sweep with plateau
//! early exit, brute-force and quick generators, and the quick-plus-sweep
//! orchestrator that composes them.

mod brute;
mod coordinate_data;
mod factory;
mod generator;
mod neighborhood;
mod quick;
mod quick_plus_sweep;
mod results;
mod sweep;

pub use brute::{model_variants, variant_combinations, BruteRunConfigGenerator};
pub use coordinate_data::CoordinateData;
pub use factory::{create_run_config_generator, RunConfigGenerator};
pub use generator::{best_by_rank, best_by_throughput, drive, Chain, ConfigGenerator};
pub use neighborhood::{Neighborhood, TRANSLATION_LIST};
pub use quick::QuickRunConfigGenerator;
pub use quick_plus_sweep::{
    derive_sweep_config, derive_sweep_configs, QuickPlusConcurrencySweepGenerator,
};
pub use results::{ResultStore, RunResult};
pub use sweep::{generate_doubled_list, throughput_gain_valid, PerfConfigGenerator};
