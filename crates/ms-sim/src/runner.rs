//! Drives a search against the synthetic endpoint.

use ms_search::{create_run_config_generator, ResultStore, RunResult};
use ms_types::{
    config_error, Constraints, ModelSpec, MsResult, Objectives, PerfMeasurement, SearchConfig,
    SearchMode,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::endpoint::{EndpointModel, SyntheticEndpoint};

/// Everything a simulated search needs, loadable from one JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub search: SearchConfig,
    pub endpoint: EndpointModel,
    pub constraints: Constraints,
    pub objectives: Objectives,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::new(vec![ModelSpec::new("synthetic")]),
            endpoint: EndpointModel::default(),
            constraints: Constraints::none(),
            objectives: Objectives::default(),
            seed: 42,
        }
    }
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> MsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MsResult<()> {
        self.search.validate()?;
        let endpoint = &self.endpoint;
        if endpoint.base_latency_ms <= 0.0 || endpoint.per_item_latency_ms < 0.0 {
            return Err(config_error!(
                "endpoint latencies must be positive, got base {} and per item {}",
                endpoint.base_latency_ms,
                endpoint.per_item_latency_ms
            ));
        }
        if !(0.0..1.0).contains(&endpoint.jitter) {
            return Err(config_error!("endpoint jitter {} outside [0, 1)", endpoint.jitter));
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> MsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn endpoint(&self) -> SyntheticEndpoint {
        SyntheticEndpoint::new(self.endpoint.clone(), self.seed)
            .with_constraints(self.constraints)
            .with_objectives(self.objectives)
    }
}

/// Outcome of one simulated search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub mode: SearchMode,
    /// Candidates handed to the endpoint.
    pub candidates: usize,
    /// Candidates whose profiling run failed.
    pub failed: usize,
    /// Best result per model variant, best first.
    pub top_results: Vec<RunResult<PerfMeasurement>>,
}

/// Run the configured search to exhaustion against `endpoint`.
pub fn run_search(
    config: &SearchConfig,
    endpoint: &mut SyntheticEndpoint,
) -> MsResult<SearchReport> {
    let mut generator = create_run_config_generator::<PerfMeasurement>(config)?;
    let mut results = ResultStore::new();
    let mut candidates = 0;
    let mut failed = 0;

    while !generator.is_done() {
        let run_config = generator.next_config()?;
        candidates += 1;
        let measurement = endpoint.measure(&run_config);
        match &measurement {
            Some(m) => {
                results.add_result(run_config, m.clone());
            }
            None => failed += 1,
        }
        generator.set_last_results(vec![measurement])?;
    }

    let top_results: Vec<_> = results.top_n(config.top_n).into_iter().cloned().collect();
    if let Some(best) = top_results.first() {
        info!(
            candidates,
            failed,
            best = %best.run_config,
            throughput = best.measurement.throughput,
            "Search complete"
        );
    } else {
        info!(candidates, failed, "Search complete without a successful measurement");
    }

    Ok(SearchReport {
        mode: config.mode,
        candidates,
        failed,
        top_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_types::{Measurement, MsError};

    fn sim(mode: SearchMode) -> SimConfig {
        let mut config = SimConfig::default();
        config.search = config.search.with_mode(mode);
        config.endpoint.jitter = 0.0;
        config
    }

    fn report(config: &SimConfig) -> SearchReport {
        let mut endpoint = config.endpoint();
        let report = run_search(&config.search, &mut endpoint).unwrap();
        assert_eq!(endpoint.measurements(), report.candidates);
        report
    }

    #[test]
    fn quick_search_is_cheaper_than_brute() {
        let quick = report(&sim(SearchMode::Quick));
        let brute = report(&sim(SearchMode::Brute));

        assert!(quick.candidates > 0);
        // 8 batch sizes × 5 instance counts
        assert!(quick.candidates <= 40);
        assert!(brute.candidates > quick.candidates);
        assert!(brute.failed > 0);
        assert_eq!(quick.top_results.len(), 3);
    }

    #[test]
    fn quick_plus_sweep_reports_ranked_results() {
        let report = report(&sim(SearchMode::QuickPlusSweep));
        assert_eq!(report.mode, SearchMode::QuickPlusSweep);
        assert_eq!(report.top_results.len(), 3);
        for pair in report.top_results.windows(2) {
            assert!(pair[0].measurement.throughput >= pair[1].measurement.throughput);
        }
        let keys: std::collections::HashSet<_> = report
            .top_results
            .iter()
            .map(|r| r.run_config.variant_key())
            .collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn latency_constraint_is_honoured() {
        let mut config = sim(SearchMode::QuickPlusSweep);
        config.constraints = Constraints::none().with_max_latency(50.0);
        let report = report(&config);
        assert!(report.top_results[0].measurement.is_passing_constraints());
        assert!(report.top_results[0].measurement.p99_latency_ms <= 50.0);
    }

    #[test]
    fn report_serializes() {
        let report = report(&sim(SearchMode::Quick));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "quick");
        assert_eq!(json["top_results"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn sim_config_from_json() {
        let config = SimConfig::from_json_str(
            r#"{
                "search": {"models": [{"name": "bert"}], "mode": "brute"},
                "endpoint": {"jitter": 0.0},
                "seed": 9
            }"#,
        )
        .unwrap();
        assert_eq!(config.search.mode, SearchMode::Brute);
        assert_eq!(config.endpoint.base_latency_ms, 4.0);
        assert_eq!(config.seed, 9);

        let err = SimConfig::from_json_str(r#"{"search": {"models": []}}"#).unwrap_err();
        assert!(matches!(err, MsError::Validation(_)));

        let err = SimConfig::from_json_str(r#"{"endpoint": {"jitter": 1.5}}"#).unwrap_err();
        assert!(matches!(err, MsError::Config(_)));
    }

    #[test]
    fn bundled_config_runs() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/sweep-sim.json");
        let config = SimConfig::from_json_file(path).unwrap();
        assert!(config.search.early_exit_enable);

        let report = report(&config);
        assert!(report.candidates > 0);
        assert!(!report.top_results.is_empty());
    }
}
