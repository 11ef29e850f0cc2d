use ms_types::{Measurement, MsResult, RunConfig, SearchConfig, SearchMode};
use tracing::info;

use crate::brute::BruteRunConfigGenerator;
use crate::generator::ConfigGenerator;
use crate::quick::QuickRunConfigGenerator;
use crate::quick_plus_sweep::QuickPlusConcurrencySweepGenerator;

/// Boxed run-config generator for any search mode.
pub type RunConfigGenerator<M> = Box<dyn ConfigGenerator<M, Config = RunConfig>>;

/// Validate `config` and build the generator for its search mode.
pub fn create_run_config_generator<M: Measurement + 'static>(
    config: &SearchConfig,
) -> MsResult<RunConfigGenerator<M>> {
    config.validate()?;
    info!(mode = ?config.mode, models = config.models.len(), "Creating run config generator");

    let generator: RunConfigGenerator<M> = match config.mode {
        SearchMode::Quick => Box::new(QuickRunConfigGenerator::<M>::new(config)),
        SearchMode::Brute => Box::new(BruteRunConfigGenerator::<M>::new(config, false)),
        SearchMode::QuickPlusSweep => {
            Box::new(QuickPlusConcurrencySweepGenerator::<M>::new(config))
        }
    };
    Ok(generator)
}
