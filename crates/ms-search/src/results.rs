//! Measured candidates and the top-N query the sweep phase is derived from.

use chrono::{DateTime, Utc};
use ms_types::{Measurement, RunConfig};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// One measured candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult<M> {
    pub id: Uuid,
    /// Position in the order results were recorded, starting at 0.
    pub trial_number: usize,
    pub run_config: RunConfig,
    pub measurement: M,
    pub recorded_at: DateTime<Utc>,
}

/// Results of one search, in the order they were recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultStore<M> {
    pub search_id: Uuid,
    results: Vec<RunResult<M>>,
}

impl<M: Measurement> ResultStore<M> {
    pub fn new() -> Self {
        Self {
            search_id: Uuid::new_v4(),
            results: Vec::new(),
        }
    }

    pub fn add_result(&mut self, run_config: RunConfig, measurement: M) -> Uuid {
        let id = Uuid::new_v4();
        self.results.push(RunResult {
            id,
            trial_number: self.results.len(),
            run_config,
            measurement,
            recorded_at: Utc::now(),
        });
        id
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunResult<M>> {
        self.results.iter()
    }

    pub fn best(&self) -> Option<&RunResult<M>> {
        self.top_n(1).into_iter().next()
    }

    /// The `n` best results with distinct model variants.
    ///
    /// Only the best measurement of each variant is considered. Results
    /// passing their constraints rank above failing ones; equally ranked
    /// results keep the order in which they were first recorded.
    pub fn top_n(&self, n: usize) -> Vec<&RunResult<M>> {
        let mut per_variant: Vec<&RunResult<M>> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();
        for result in &self.results {
            let key = result.run_config.variant_key();
            match index_by_key.get(&key) {
                Some(&i) => {
                    if compare(&result.measurement, &per_variant[i].measurement)
                        == Ordering::Greater
                    {
                        per_variant[i] = result;
                    }
                }
                None => {
                    index_by_key.insert(key, per_variant.len());
                    per_variant.push(result);
                }
            }
        }

        // selection keeps the first-recorded result on ties
        let mut top = Vec::with_capacity(n.min(per_variant.len()));
        while top.len() < n && !per_variant.is_empty() {
            let mut best = 0;
            for i in 1..per_variant.len() {
                if compare(&per_variant[i].measurement, &per_variant[best].measurement)
                    == Ordering::Greater
                {
                    best = i;
                }
            }
            top.push(per_variant.remove(best));
        }
        top
    }
}

impl<M: Measurement> Default for ResultStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn compare<M: Measurement>(a: &M, b: &M) -> Ordering {
    match (a.is_passing_constraints(), b.is_passing_constraints()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.rank_cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_types::{Constraints, ModelRunConfig, ModelVariant, PerfConfig, PerfMeasurement};

    fn run_config(max_batch_size: u32, concurrency: u32) -> RunConfig {
        RunConfig::new(vec![ModelRunConfig {
            model_name: "m".into(),
            variant: ModelVariant::new(max_batch_size, 1),
            perf: PerfConfig {
                batch_size: 1,
                concurrency,
                request_count: 2 * concurrency,
            },
        }])
    }

    fn batch_sizes(results: &[&RunResult<PerfMeasurement>]) -> Vec<u32> {
        results
            .iter()
            .map(|r| r.run_config.models[0].variant.max_batch_size)
            .collect()
    }

    #[test]
    fn add_result_numbers_trials() {
        let mut store = ResultStore::new();
        assert!(store.is_empty());
        assert!(store.best().is_none());

        let a = store.add_result(run_config(1, 2), PerfMeasurement::new(10.0, 1.0));
        let b = store.add_result(run_config(2, 4), PerfMeasurement::new(20.0, 1.0));

        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        let numbers: Vec<_> = store.iter().map(|r| r.trial_number).collect();
        assert_eq!(numbers, vec![0, 1]);
        assert_eq!(store.best().unwrap().id, b);
    }

    #[test]
    fn top_n_keeps_best_per_variant() {
        let mut store = ResultStore::new();
        store.add_result(run_config(1, 2), PerfMeasurement::new(10.0, 1.0));
        store.add_result(run_config(2, 4), PerfMeasurement::new(30.0, 1.0));
        store.add_result(run_config(2, 8), PerfMeasurement::new(50.0, 1.0));
        store.add_result(run_config(4, 8), PerfMeasurement::new(40.0, 1.0));

        let top = store.top_n(3);
        assert_eq!(batch_sizes(&top), vec![2, 4, 1]);
        assert_eq!(top[0].run_config.models[0].perf.concurrency, 8);
        assert_eq!(store.top_n(10).len(), 3);
        assert!(store.top_n(0).is_empty());
    }

    #[test]
    fn passing_results_rank_first() {
        let constraints = Constraints::none().with_max_latency(5.0);
        let mut store = ResultStore::new();
        store.add_result(
            run_config(1, 2),
            PerfMeasurement::new(10.0, 1.0).with_constraints(constraints),
        );
        store.add_result(
            run_config(2, 2),
            PerfMeasurement::new(90.0, 9.0).with_constraints(constraints),
        );

        assert_eq!(batch_sizes(&store.top_n(2)), vec![1, 2]);
    }

    #[test]
    fn ties_keep_recording_order() {
        let mut store = ResultStore::new();
        for bs in [4, 1, 2] {
            store.add_result(run_config(bs, 2), PerfMeasurement::new(10.0, 1.0));
        }
        assert_eq!(batch_sizes(&store.top_n(3)), vec![4, 1, 2]);
    }

    #[test]
    fn serializes_to_json() {
        let mut store = ResultStore::new();
        store.add_result(run_config(1, 2), PerfMeasurement::new(10.0, 1.0));
        let json = serde_json::to_string(&store).unwrap();
        let back: ResultStore<PerfMeasurement> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.search_id, store.search_id);
        assert_eq!(back.len(), 1);
    }
}
