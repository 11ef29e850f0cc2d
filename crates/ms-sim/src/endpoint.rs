//! Analytic stand-in for a served model under load.

use ms_types::{Constraints, ModelRunConfig, Objectives, PerfMeasurement, RunConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Latency multiplier from mean to p99.
const P99_FACTOR: f64 = 1.5;
/// Relative capacity of each instance past the saturation point.
const OVERSUBSCRIBED_INSTANCE_GAIN: f64 = 0.25;

/// Cost model of one served model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointModel {
    /// Fixed cost of executing one server-side batch.
    pub base_latency_ms: f64,
    /// Additional cost per inference in a batch.
    pub per_item_latency_ms: f64,
    /// Instances the device runs in parallel before they start to contend.
    pub saturation_instances: u32,
    /// Largest `max_batch_size × instance_count` that fits in device
    /// memory; larger variants fail to load.
    pub memory_budget: Option<u32>,
    /// Relative throughput noise, uniform in `[-jitter, jitter]`.
    pub jitter: f64,
}

impl Default for EndpointModel {
    fn default() -> Self {
        Self {
            base_latency_ms: 4.0,
            per_item_latency_ms: 0.5,
            saturation_instances: 2,
            memory_budget: Some(256),
            jitter: 0.02,
        }
    }
}

/// Produces [`PerfMeasurement`]s for run configs from an [`EndpointModel`].
#[derive(Debug, Clone)]
pub struct SyntheticEndpoint {
    model: EndpointModel,
    constraints: Constraints,
    objectives: Objectives,
    rng: StdRng,
    measurements: usize,
}

impl SyntheticEndpoint {
    pub fn new(model: EndpointModel, seed: u64) -> Self {
        Self {
            model,
            constraints: Constraints::none(),
            objectives: Objectives::default(),
            rng: StdRng::seed_from_u64(seed),
            measurements: 0,
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_objectives(mut self, objectives: Objectives) -> Self {
        self.objectives = objectives;
        self
    }

    /// Profiling runs performed so far, failed ones included.
    pub fn measurements(&self) -> usize {
        self.measurements
    }

    /// Profile every model of `run_config` together. Returns `None` when any
    /// model variant does not fit in memory.
    ///
    /// Throughput adds up across models; latency is the worst model's.
    pub fn measure(&mut self, run_config: &RunConfig) -> Option<PerfMeasurement> {
        self.measurements += 1;

        let mut throughput = 0.0;
        let mut latency: f64 = 0.0;
        for model in &run_config.models {
            let (t, l) = self.measure_model(model)?;
            throughput += t;
            latency = latency.max(l);
        }

        if self.model.jitter > 0.0 {
            let noise = self.rng.random_range(-self.model.jitter..=self.model.jitter);
            throughput *= 1.0 + noise;
        }
        debug!(run_config = %run_config, throughput, p99_latency_ms = latency, "Measured");

        Some(
            PerfMeasurement::new(throughput, latency)
                .with_constraints(self.constraints)
                .with_objectives(self.objectives),
        )
    }

    fn measure_model(&self, model: &ModelRunConfig) -> Option<(f64, f64)> {
        let variant = model.variant;
        if let Some(budget) = self.model.memory_budget {
            if variant.max_batch_size.saturating_mul(variant.instance_count) > budget {
                debug!(model = %model.model_name, "Variant does not fit in memory");
                return None;
            }
        }

        let in_flight = f64::from(model.perf.concurrency) * f64::from(model.perf.batch_size);
        let batch = f64::from(variant.max_batch_size).min(in_flight).max(1.0);
        let batch_time_ms = self.model.base_latency_ms + self.model.per_item_latency_ms * batch;

        let instances = f64::from(variant.instance_count);
        let saturation = f64::from(self.model.saturation_instances.max(1));
        let effective_instances = if instances <= saturation {
            instances
        } else {
            saturation + (instances - saturation) * OVERSUBSCRIBED_INSTANCE_GAIN
        };

        let capacity = effective_instances * batch * 1000.0 / batch_time_ms;
        let throughput = capacity * (1.0 - (-in_flight / (batch * effective_instances)).exp());
        // Little's law
        let latency_ms = in_flight * 1000.0 / throughput * P99_FACTOR;
        Some((throughput, latency_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_types::{Measurement, ModelVariant, PerfConfig};

    fn quiet_model() -> EndpointModel {
        EndpointModel {
            jitter: 0.0,
            ..EndpointModel::default()
        }
    }

    fn run_config(max_batch_size: u32, instance_count: u32, concurrency: u32) -> RunConfig {
        RunConfig::new(vec![ModelRunConfig {
            model_name: "synthetic".into(),
            variant: ModelVariant::new(max_batch_size, instance_count),
            perf: PerfConfig {
                batch_size: 1,
                concurrency,
                request_count: 2 * concurrency,
            },
        }])
    }

    #[test]
    fn throughput_saturates_with_concurrency() {
        let mut endpoint = SyntheticEndpoint::new(quiet_model(), 0);
        let samples: Vec<_> = [1, 4, 16, 64, 256]
            .iter()
            .map(|c| endpoint.measure(&run_config(8, 1, *c)).unwrap())
            .collect();

        for pair in samples.windows(2) {
            assert!(pair[1].throughput >= pair[0].throughput);
            assert!(pair[1].p99_latency_ms >= pair[0].p99_latency_ms);
        }
        let last = samples[4].throughput;
        let before = samples[3].throughput;
        assert!((last - before) / before < 0.01);
        assert_eq!(endpoint.measurements(), 5);
    }

    #[test]
    fn larger_batches_raise_capacity() {
        let mut endpoint = SyntheticEndpoint::new(quiet_model(), 0);
        let small = endpoint.measure(&run_config(1, 1, 256)).unwrap();
        let large = endpoint.measure(&run_config(32, 1, 256)).unwrap();
        assert!(large.throughput > small.throughput * 2.0);
    }

    #[test]
    fn oversized_variants_fail() {
        let mut endpoint = SyntheticEndpoint::new(quiet_model(), 0);
        assert!(endpoint.measure(&run_config(128, 3, 8)).is_none());
        assert!(endpoint.measure(&run_config(64, 5, 8)).is_none());
        assert!(endpoint.measure(&run_config(128, 2, 8)).is_some());
        assert_eq!(endpoint.measurements(), 3);
    }

    #[test]
    fn jitter_is_seeded() {
        let mut a = SyntheticEndpoint::new(EndpointModel::default(), 7);
        let mut b = SyntheticEndpoint::new(EndpointModel::default(), 7);
        for c in [1, 2, 4] {
            assert_eq!(a.measure(&run_config(4, 1, c)), b.measure(&run_config(4, 1, c)));
        }
    }

    #[test]
    fn constraints_travel_with_measurements() {
        let mut endpoint = SyntheticEndpoint::new(quiet_model(), 0)
            .with_constraints(Constraints::none().with_max_latency(20.0));
        assert!(endpoint.measure(&run_config(1, 1, 1)).unwrap().is_passing_constraints());
        assert!(!endpoint.measure(&run_config(1, 1, 512)).unwrap().is_passing_constraints());
    }
}
