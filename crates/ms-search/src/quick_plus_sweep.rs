//! Hill climbing followed by focused concurrency sweeps.
//!
//! The quick search runs to convergence first. Its `top_n` best variants
//! then each get a brute-force sweep with the model variant pinned and
//! concurrency swept from 1 to 1024 with plateau early exit. Only the
//! first of those sweeps measures the models' default configuration.

use ms_types::{
    Bounds, Measurement, MsResult, RunConfig, SearchConfig, SearchMode,
    DEFAULT_RUN_CONFIG_MAX_CONCURRENCY, DEFAULT_RUN_CONFIG_MIN_CONCURRENCY,
};
use tracing::info;

use crate::brute::BruteRunConfigGenerator;
use crate::generator::{best_by_rank, exhausted, unexpected_feedback, Chain, ConfigGenerator};
use crate::quick::QuickRunConfigGenerator;
use crate::results::ResultStore;

/// Sweep configuration pinned to the variant of `run_config`.
pub fn derive_sweep_config(base: &SearchConfig, run_config: &RunConfig) -> SearchConfig {
    let mut config = base
        .clone()
        .with_mode(SearchMode::Brute)
        .with_early_exit(true)
        .with_concurrency(
            DEFAULT_RUN_CONFIG_MIN_CONCURRENCY,
            DEFAULT_RUN_CONFIG_MAX_CONCURRENCY,
        );
    config.concurrency_list.clear();

    for model in &mut config.models {
        if let Some(found) = run_config.models.iter().find(|m| m.model_name == model.name) {
            model.model_batch_size = Some(Bounds::fixed(found.variant.max_batch_size));
            model.instance_count = Some(Bounds::fixed(found.variant.instance_count));
        }
    }
    config
}

/// One derived sweep per top result, in ranking order.
pub fn derive_sweep_configs<M: Measurement>(
    base: &SearchConfig,
    results: &ResultStore<M>,
) -> Vec<SearchConfig> {
    results
        .top_n(base.top_n)
        .into_iter()
        .map(|result| derive_sweep_config(base, &result.run_config))
        .collect()
}

enum Phase<M> {
    Quick(QuickRunConfigGenerator<M>),
    Sweep(Chain<M, RunConfig>),
    Done,
}

pub struct QuickPlusConcurrencySweepGenerator<M> {
    config: SearchConfig,
    phase: Phase<M>,
    results: ResultStore<M>,
    sweep_configs: Vec<SearchConfig>,
    pending: Option<RunConfig>,
}

impl<M: Measurement + 'static> QuickPlusConcurrencySweepGenerator<M> {
    pub fn new(config: &SearchConfig) -> Self {
        let mut generator = Self {
            config: config.clone(),
            phase: Phase::Quick(QuickRunConfigGenerator::<M>::new(config)),
            results: ResultStore::new(),
            sweep_configs: Vec::new(),
            pending: None,
        };
        generator.advance_phase();
        generator
    }

    /// Every measured candidate so far, from both phases.
    pub fn results(&self) -> &ResultStore<M> {
        &self.results
    }

    /// Sweep configurations derived once the quick phase finished.
    pub fn sweep_configs(&self) -> &[SearchConfig] {
        &self.sweep_configs
    }

    pub fn in_sweep_phase(&self) -> bool {
        matches!(self.phase, Phase::Sweep(_))
    }

    fn advance_phase(&mut self) {
        if matches!(&self.phase, Phase::Quick(quick) if quick.is_done()) {
            self.sweep_configs = derive_sweep_configs(&self.config, &self.results);
            info!(
                quick_results = self.results.len(),
                sweeps = self.sweep_configs.len(),
                "Quick search finished, starting concurrency sweeps"
            );

            let sweeps = self
                .sweep_configs
                .iter()
                .enumerate()
                .map(|(i, config)| {
                    Box::new(BruteRunConfigGenerator::<M>::new(config, i != 0))
                        as Box<dyn ConfigGenerator<M, Config = RunConfig>>
                })
                .collect();
            self.phase = Phase::Sweep(Chain::new(sweeps));
        }
        if matches!(&self.phase, Phase::Sweep(sweep) if sweep.is_done()) {
            info!(results = self.results.len(), "Concurrency sweeps finished");
            self.phase = Phase::Done;
        }
    }
}

impl<M: Measurement + 'static> ConfigGenerator<M> for QuickPlusConcurrencySweepGenerator<M> {
    type Config = RunConfig;

    fn name(&self) -> &str {
        "quick_plus_concurrency_sweep"
    }

    fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    fn next_config(&mut self) -> MsResult<RunConfig> {
        if self.pending.is_some() {
            return Err(unexpected_feedback(
                self.name(),
                "next configuration requested before results of the previous one",
            ));
        }
        let run_config = match &mut self.phase {
            Phase::Quick(quick) => quick.next_config()?,
            Phase::Sweep(sweep) => sweep.next_config()?,
            Phase::Done => return Err(exhausted("quick_plus_concurrency_sweep")),
        };
        self.pending = Some(run_config.clone());
        Ok(run_config)
    }

    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()> {
        let Some(run_config) = self.pending.take() else {
            return Err(unexpected_feedback(self.name(), "no configuration pending"));
        };
        if let Some(best) = best_by_rank(measurements.clone()) {
            self.results.add_result(run_config, best);
        }

        match &mut self.phase {
            Phase::Quick(quick) => quick.set_last_results(measurements)?,
            Phase::Sweep(sweep) => sweep.set_last_results(measurements)?,
            Phase::Done => return Err(exhausted("quick_plus_concurrency_sweep")),
        }
        self.advance_phase();
        Ok(())
    }
}
