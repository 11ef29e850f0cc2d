//! Concurrency and client batch-size sweep for one model configuration.

use ms_types::{Measurement, MsResult, PerfConfig, SearchConfig};
use tracing::{debug, info};

use crate::generator::{best_by_throughput, exhausted, unexpected_feedback, ConfigGenerator};

/// `min, 2·min, 4·min, ...` up to and including `max`.
pub fn generate_doubled_list(min: u32, max: u32) -> Vec<u32> {
    let mut list = Vec::new();
    if min == 0 {
        return list;
    }
    let mut value = min;
    while value <= max {
        list.push(value);
        match value.checked_mul(2) {
            Some(next) => value = next,
            None => break,
        }
    }
    list
}

/// Whether the trailing `window` throughputs still show a relative gain
/// above `min_gain`. Fewer than `window` samples always count as gaining.
pub fn throughput_gain_valid(throughputs: &[f64], window: usize, min_gain: f64) -> bool {
    if throughputs.len() < window || window < 2 {
        return true;
    }
    let recent = &throughputs[throughputs.len() - window..];
    let first = recent[0];
    let best = recent[1..].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if first <= 0.0 {
        return best > first;
    }
    (best - first) / first > min_gain
}

/// Produces profiler load settings: client batch sizes in the outer loop,
/// doubling concurrency in the inner loop.
///
/// With early exit enabled the concurrency walk for a batch size stops once
/// throughput plateaus, and the batch-size walk stops once the best
/// throughput per batch size plateaus. A failed measurement always ends
/// the current concurrency walk.
#[derive(Debug, Clone)]
pub struct PerfConfigGenerator {
    batch_sizes: Vec<u32>,
    concurrencies: Vec<u32>,
    request_count_multiplier: u32,
    early_exit_enable: bool,
    early_exit_window: usize,
    min_throughput_gain: f64,

    batch_index: usize,
    concurrency_index: usize,
    concurrency_throughputs: Vec<f64>,
    batch_throughputs: Vec<f64>,
    awaiting_feedback: bool,
    done: bool,
}

impl PerfConfigGenerator {
    pub fn new(config: &SearchConfig) -> Self {
        let concurrencies = if config.concurrency_list.is_empty() {
            generate_doubled_list(config.concurrency.min, config.concurrency.max)
        } else {
            config.concurrency_list.clone()
        };
        let batch_sizes = config.batch_sizes.clone();
        let done = batch_sizes.is_empty() || concurrencies.is_empty();

        Self {
            batch_sizes,
            concurrencies,
            request_count_multiplier: config.request_count_multiplier,
            early_exit_enable: config.early_exit_enable,
            early_exit_window: config.early_exit_window,
            min_throughput_gain: config.min_throughput_gain,
            batch_index: 0,
            concurrency_index: 0,
            concurrency_throughputs: Vec::new(),
            batch_throughputs: Vec::new(),
            awaiting_feedback: false,
            done,
        }
    }

    pub fn concurrencies(&self) -> &[u32] {
        &self.concurrencies
    }

    pub fn calculate_request_count(&self, concurrency: u32) -> u32 {
        self.request_count_multiplier.saturating_mul(concurrency)
    }

    fn step(&mut self, last_erroneous: bool) {
        self.concurrency_index += 1;
        if !self.done_walking_concurrencies(last_erroneous) {
            return;
        }

        let best = self
            .concurrency_throughputs
            .iter()
            .copied()
            .fold(0.0, f64::max);
        self.batch_throughputs.push(best);
        self.concurrency_throughputs.clear();
        self.concurrency_index = 0;
        self.batch_index += 1;

        if self.done_walking_batch_sizes() {
            self.done = true;
        }
    }

    fn done_walking_concurrencies(&self, last_erroneous: bool) -> bool {
        if self.concurrency_index >= self.concurrencies.len() {
            return true;
        }
        if last_erroneous {
            info!(
                batch_size = self.batch_sizes[self.batch_index],
                "Measurement failed, no longer increasing concurrency"
            );
            return true;
        }
        if self.early_exit_enable
            && !throughput_gain_valid(
                &self.concurrency_throughputs,
                self.early_exit_window,
                self.min_throughput_gain,
            )
        {
            info!(
                batch_size = self.batch_sizes[self.batch_index],
                concurrency = self.concurrencies[self.concurrency_index - 1],
                "No longer increasing concurrency as throughput has plateaued"
            );
            return true;
        }
        false
    }

    fn done_walking_batch_sizes(&self) -> bool {
        if self.batch_index >= self.batch_sizes.len() {
            return true;
        }
        if self.early_exit_enable
            && !throughput_gain_valid(
                &self.batch_throughputs,
                self.early_exit_window,
                self.min_throughput_gain,
            )
        {
            info!("No longer increasing client batch size as throughput has plateaued");
            return true;
        }
        false
    }
}

impl<M: Measurement> ConfigGenerator<M> for PerfConfigGenerator {
    type Config = PerfConfig;

    fn name(&self) -> &str {
        "perf_sweep"
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn next_config(&mut self) -> MsResult<PerfConfig> {
        if self.done {
            return Err(exhausted("perf_sweep"));
        }
        if self.awaiting_feedback {
            return Err(unexpected_feedback(
                "perf_sweep",
                "next configuration requested before results of the previous one",
            ));
        }
        let concurrency = self.concurrencies[self.concurrency_index];
        let config = PerfConfig {
            batch_size: self.batch_sizes[self.batch_index],
            concurrency,
            request_count: self.calculate_request_count(concurrency),
        };
        self.awaiting_feedback = true;
        Ok(config)
    }

    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()> {
        if !self.awaiting_feedback {
            return Err(unexpected_feedback("perf_sweep", "no configuration pending"));
        }
        self.awaiting_feedback = false;

        let best = best_by_throughput(measurements);
        if let Some(m) = &best {
            debug!(throughput = m.throughput(), "Sweep measurement recorded");
            self.concurrency_throughputs.push(m.throughput());
        }
        self.step(best.is_none());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::drive;
    use ms_types::{ModelSpec, MsError, PerfMeasurement, SearchError};

    fn config(max_concurrency: u32, early_exit: bool) -> SearchConfig {
        SearchConfig::new(vec![ModelSpec::new("my-model")])
            .with_concurrency(1, max_concurrency)
            .with_early_exit(early_exit)
    }

    /// Drives a sweep, feeding back throughputs from `feed` in order
    /// (doubling forever once it runs out).
    fn run(config: &SearchConfig, feed: &[f64]) -> Vec<PerfConfig> {
        let mut sweep = PerfConfigGenerator::new(config);
        let mut produced = Vec::new();
        let mut next = 1.0;
        drive::<PerfMeasurement, _, _>(&mut sweep, |pc| {
            let throughput = feed.get(produced.len()).copied().unwrap_or_else(|| {
                next *= 2.0;
                next
            });
            produced.push(*pc);
            Some(PerfMeasurement::new(throughput, 1.0))
        })
        .unwrap();
        produced
    }

    fn concurrencies(configs: &[PerfConfig]) -> Vec<u32> {
        configs.iter().map(|c| c.concurrency).collect()
    }

    #[test]
    fn doubled_list() {
        assert_eq!(generate_doubled_list(1, 16), vec![1, 2, 4, 8, 16]);
        assert_eq!(generate_doubled_list(5, 16), vec![5, 10]);
        assert_eq!(generate_doubled_list(1, 1000).len(), 10);
        assert!(generate_doubled_list(8, 4).is_empty());
        assert!(generate_doubled_list(0, 4).is_empty());
        assert_eq!(generate_doubled_list(u32::MAX, u32::MAX), vec![u32::MAX]);
    }

    #[test]
    fn gain_validity() {
        assert!(throughput_gain_valid(&[1.0, 1.0, 1.0], 4, 0.05));
        assert!(throughput_gain_valid(&[1.0, 2.0, 4.0, 4.0], 4, 0.05));
        assert!(!throughput_gain_valid(&[4.0, 4.0, 4.0, 4.0], 4, 0.05));
        assert!(!throughput_gain_valid(&[100.0, 101.0, 102.0, 104.0], 4, 0.05));
        assert!(!throughput_gain_valid(&[0.0, 0.0, 0.0, 0.0], 4, 0.05));
    }

    #[test]
    fn sweep_without_early_exit_is_full_doubling() {
        let produced = run(&config(16, false), &[]);
        assert_eq!(concurrencies(&produced), vec![1, 2, 4, 8, 16]);
        assert!(produced.iter().all(|c| c.batch_size == 1));
    }

    #[test]
    fn early_exit_without_plateau_runs_to_max() {
        let produced = run(&config(64, true), &[]);
        assert_eq!(concurrencies(&produced), vec![1, 2, 4, 8, 16, 32, 64]);
    }

    #[test]
    fn early_exit_on_plateau() {
        let feed = [1.0, 2.0, 4.0, 4.0, 4.0, 4.0, 4.0];
        let with_exit = run(&config(64, true), &feed);
        let without_exit = run(&config(64, false), &feed);

        // the window [4, 4, 4, 4] after the sixth measurement is flat
        assert_eq!(concurrencies(&with_exit), vec![1, 2, 4, 8, 16, 32]);
        assert_eq!(concurrencies(&without_exit), vec![1, 2, 4, 8, 16, 32, 64]);
        assert!(with_exit.len() < without_exit.len());
    }

    #[test]
    fn request_count_scales_with_concurrency() {
        let sweep = PerfConfigGenerator::new(&config(1024, false));
        assert_eq!(sweep.calculate_request_count(128), 256);

        let produced = run(&config(8, false), &[]);
        for pc in produced {
            assert_eq!(pc.request_count, 2 * pc.concurrency);
        }
    }

    #[test]
    fn batch_sizes_are_the_outer_loop() {
        let mut config = config(2, false);
        config.batch_sizes = vec![1, 4];
        let produced = run(&config, &[]);
        let pairs: Vec<_> = produced.iter().map(|c| (c.batch_size, c.concurrency)).collect();
        assert_eq!(pairs, vec![(1, 1), (1, 2), (4, 1), (4, 2)]);
    }

    #[test]
    fn explicit_concurrency_list_overrides_range() {
        let mut config = config(1024, false);
        config.concurrency_list = vec![3, 7];
        let produced = run(&config, &[]);
        assert_eq!(concurrencies(&produced), vec![3, 7]);
    }

    #[test]
    fn failed_measurement_ends_concurrency_walk() {
        let mut config = config(16, false);
        config.batch_sizes = vec![1, 2];
        let mut sweep = PerfConfigGenerator::new(&config);
        let mut produced = Vec::new();
        drive::<PerfMeasurement, _, _>(&mut sweep, |pc| {
            produced.push((pc.batch_size, pc.concurrency));
            if pc.concurrency == 4 {
                None
            } else {
                Some(PerfMeasurement::new(f64::from(pc.concurrency), 1.0))
            }
        })
        .unwrap();

        assert_eq!(produced, vec![(1, 1), (1, 2), (1, 4), (2, 1), (2, 2), (2, 4)]);
    }

    #[test]
    fn batch_size_plateau_stops_sweep() {
        let mut config = config(1, true);
        config.batch_sizes = vec![1, 2, 4, 8, 16, 32];
        let produced = run(&config, &[10.0; 6]);
        assert_eq!(produced.len(), 4);
    }

    #[test]
    fn protocol_violations() {
        let mut sweep = PerfConfigGenerator::new(&config(1, false));
        assert!(matches!(
            ConfigGenerator::<PerfMeasurement>::set_last_results(&mut sweep, vec![None]),
            Err(MsError::Search(SearchError::UnexpectedFeedback { .. }))
        ));
        ConfigGenerator::<PerfMeasurement>::next_config(&mut sweep).unwrap();
        assert!(matches!(
            ConfigGenerator::<PerfMeasurement>::next_config(&mut sweep),
            Err(MsError::Search(SearchError::UnexpectedFeedback { .. }))
        ));
        sweep
            .set_last_results(vec![Some(PerfMeasurement::new(1.0, 1.0))])
            .unwrap();
        assert!(ConfigGenerator::<PerfMeasurement>::is_done(&sweep));
        assert!(matches!(
            ConfigGenerator::<PerfMeasurement>::next_config(&mut sweep),
            Err(MsError::Search(SearchError::GeneratorExhausted { .. }))
        ));
    }

    #[test]
    fn empty_range_is_done_immediately() {
        let sweep = PerfConfigGenerator::new(&config(1, false).with_concurrency(8, 4));
        assert!(ConfigGenerator::<PerfMeasurement>::is_done(&sweep));
    }
}
