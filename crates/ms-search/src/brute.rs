//! Exhaustive sweep over every model variant in bounds.

use ms_types::{
    Measurement, ModelRunConfig, ModelVariant, MsResult, PerfConfig, RunConfig, SearchConfig,
};
use tracing::info;

use crate::generator::{exhausted, Chain, ConfigGenerator};
use crate::sweep::{generate_doubled_list, PerfConfigGenerator};

/// Non-default variants of one model: doubling `max_batch_size` in the
/// outer loop, every instance count in the inner loop.
pub fn model_variants(config: &SearchConfig, model_index: usize) -> Vec<ModelVariant> {
    let batch = config.model_batch_size_bounds(model_index);
    let instances = config.instance_count_bounds(model_index);

    let mut variants = Vec::new();
    for max_batch_size in generate_doubled_list(batch.min, batch.max) {
        for instance_count in instances.min..=instances.max {
            variants.push(ModelVariant::new(max_batch_size, instance_count));
        }
    }
    variants
}

/// Every model-variant combination to sweep, as `(model name, variant)`
/// lists in model order.
///
/// The all-default combination comes first unless skipped, then the
/// Cartesian product of each model's non-default variants.
pub fn variant_combinations(
    config: &SearchConfig,
    skip_default_config: bool,
) -> Vec<Vec<(String, ModelVariant)>> {
    if config.models.is_empty() {
        return Vec::new();
    }

    let mut combinations = Vec::new();
    if !skip_default_config {
        combinations.push(
            config
                .models
                .iter()
                .map(|m| {
                    let variant = ModelVariant::default_config(
                        m.default_max_batch_size,
                        m.default_instance_count,
                    );
                    (m.name.clone(), variant)
                })
                .collect(),
        );
    }

    // Cartesian product
    let mut product: Vec<Vec<(String, ModelVariant)>> = vec![Vec::new()];
    for (i, model) in config.models.iter().enumerate() {
        let variants = model_variants(config, i);
        let mut next = Vec::with_capacity(product.len() * variants.len());
        for existing in &product {
            for variant in &variants {
                let mut combo = existing.clone();
                combo.push((model.name.clone(), *variant));
                next.push(combo);
            }
        }
        product = next;
    }
    combinations.extend(product);
    combinations
}

/// Load sweep for one fixed variant combination.
struct VariantSweep {
    models: Vec<(String, ModelVariant)>,
    sweep: PerfConfigGenerator,
}

impl VariantSweep {
    fn run_config(&self, perf: PerfConfig) -> RunConfig {
        RunConfig::new(
            self.models
                .iter()
                .map(|(name, variant)| ModelRunConfig {
                    model_name: name.clone(),
                    variant: *variant,
                    perf,
                })
                .collect(),
        )
    }
}

impl<M: Measurement> ConfigGenerator<M> for VariantSweep {
    type Config = RunConfig;

    fn name(&self) -> &str {
        "variant_sweep"
    }

    fn is_done(&self) -> bool {
        ConfigGenerator::<M>::is_done(&self.sweep)
    }

    fn next_config(&mut self) -> MsResult<RunConfig> {
        let perf = ConfigGenerator::<M>::next_config(&mut self.sweep)?;
        Ok(self.run_config(perf))
    }

    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()> {
        self.sweep.set_last_results(measurements)
    }
}

/// Sweeps client load over every model variant combination in turn.
pub struct BruteRunConfigGenerator<M> {
    chain: Chain<M, RunConfig>,
    combination_count: usize,
    skip_default_config: bool,
}

impl<M: Measurement + 'static> BruteRunConfigGenerator<M> {
    pub fn new(config: &SearchConfig, skip_default_config: bool) -> Self {
        let combinations = variant_combinations(config, skip_default_config);
        let combination_count = combinations.len();
        info!(
            combinations = combination_count,
            skip_default_config, "Starting brute-force sweep"
        );

        let sweeps = combinations
            .into_iter()
            .map(|models| {
                Box::new(VariantSweep {
                    models,
                    sweep: PerfConfigGenerator::new(config),
                }) as Box<dyn ConfigGenerator<M, Config = RunConfig>>
            })
            .collect();

        Self {
            chain: Chain::new(sweeps),
            combination_count,
            skip_default_config,
        }
    }

    /// Number of variant combinations this sweep covers.
    pub fn combination_count(&self) -> usize {
        self.combination_count
    }

    pub fn skips_default(&self) -> bool {
        self.skip_default_config
    }
}

impl<M: Measurement + 'static> ConfigGenerator<M> for BruteRunConfigGenerator<M> {
    type Config = RunConfig;

    fn name(&self) -> &str {
        "brute"
    }

    fn is_done(&self) -> bool {
        self.chain.is_done()
    }

    fn next_config(&mut self) -> MsResult<RunConfig> {
        if self.chain.is_done() {
            return Err(exhausted("brute"));
        }
        self.chain.next_config()
    }

    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()> {
        self.chain.set_last_results(measurements)
    }
}
