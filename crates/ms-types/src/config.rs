//! Search configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::dimension::SearchDimension;
use crate::errors::MsResult;
use crate::validation_error;

pub const DEFAULT_RADIUS: i64 = 3;
pub const DEFAULT_MIN_INITIALIZED: usize = 3;
pub const DEFAULT_RUN_CONFIG_MIN_CONCURRENCY: u32 = 1;
pub const DEFAULT_RUN_CONFIG_MAX_CONCURRENCY: u32 = 1024;
pub const DEFAULT_RUN_CONFIG_MIN_MODEL_BATCH_SIZE: u32 = 1;
pub const DEFAULT_RUN_CONFIG_MAX_MODEL_BATCH_SIZE: u32 = 128;
pub const DEFAULT_RUN_CONFIG_MIN_INSTANCE_COUNT: u32 = 1;
pub const DEFAULT_RUN_CONFIG_MAX_INSTANCE_COUNT: u32 = 5;
pub const DEFAULT_REQUEST_COUNT_MULTIPLIER: u32 = 2;
pub const DEFAULT_EARLY_EXIT_WINDOW: usize = 4;
pub const DEFAULT_MIN_THROUGHPUT_GAIN: f64 = 0.05;
pub const DEFAULT_NUM_CONFIGS_PER_MODEL: usize = 3;

/// Which strategy drives the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Hill climbing only.
    Quick,
    /// Exhaustive sweep of every model variant.
    Brute,
    /// Hill climbing, then a concurrency sweep over the top results.
    #[default]
    QuickPlusSweep,
}

/// Inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// A range holding exactly one value.
    pub fn fixed(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn validate(&self, what: &str) -> MsResult<()> {
        if self.min == 0 {
            return Err(validation_error!("{what}: minimum must be at least 1"));
        }
        if self.min > self.max {
            return Err(validation_error!(
                "{what}: minimum {} exceeds maximum {}",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

fn default_one() -> u32 {
    1
}

/// A model to profile, with optional per-model search bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// `max_batch_size` of the model's own configuration.
    #[serde(default = "default_one")]
    pub default_max_batch_size: u32,
    /// Instance count of the model's own configuration.
    #[serde(default = "default_one")]
    pub default_instance_count: u32,
    #[serde(default)]
    pub model_batch_size: Option<Bounds>,
    #[serde(default)]
    pub instance_count: Option<Bounds>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_max_batch_size: 1,
            default_instance_count: 1,
            model_batch_size: None,
            instance_count: None,
        }
    }

    pub fn with_defaults(mut self, max_batch_size: u32, instance_count: u32) -> Self {
        self.default_max_batch_size = max_batch_size;
        self.default_instance_count = instance_count;
        self
    }
}

/// Parameters of a neighborhood search over a fixed set of dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodConfig {
    pub dimensions: Vec<SearchDimension>,
    pub radius: i64,
    /// Visited non-home neighbors required before a fast-mode step.
    pub min_initialized: usize,
}

impl NeighborhoodConfig {
    pub fn new(dimensions: Vec<SearchDimension>, radius: i64, min_initialized: usize) -> Self {
        Self {
            dimensions,
            radius,
            min_initialized,
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension(&self, index: usize) -> &SearchDimension {
        &self.dimensions[index]
    }
}

/// Top-level configuration for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub models: Vec<ModelSpec>,
    pub mode: SearchMode,

    /// Neighborhood radius for the hill-climbing search.
    pub radius: i64,
    pub min_initialized: usize,

    /// Server-side `max_batch_size` range; must be powers of two.
    pub model_batch_size: Bounds,
    pub instance_count: Bounds,

    /// Client concurrency range swept by doubling.
    pub concurrency: Bounds,
    /// Explicit concurrency values; overrides `concurrency` when non-empty.
    pub concurrency_list: Vec<u32>,
    /// Client batch sizes to sweep.
    pub batch_sizes: Vec<u32>,

    /// Profiler request count = multiplier × concurrency.
    pub request_count_multiplier: u32,

    pub early_exit_enable: bool,
    /// Trailing window of throughput samples checked for a plateau.
    pub early_exit_window: usize,
    /// Minimum relative throughput gain over the window to keep going.
    pub min_throughput_gain: f64,

    /// Results carried from the hill-climbing phase into the sweep phase.
    pub top_n: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            mode: SearchMode::default(),
            radius: DEFAULT_RADIUS,
            min_initialized: DEFAULT_MIN_INITIALIZED,
            model_batch_size: Bounds::new(
                DEFAULT_RUN_CONFIG_MIN_MODEL_BATCH_SIZE,
                DEFAULT_RUN_CONFIG_MAX_MODEL_BATCH_SIZE,
            ),
            instance_count: Bounds::new(
                DEFAULT_RUN_CONFIG_MIN_INSTANCE_COUNT,
                DEFAULT_RUN_CONFIG_MAX_INSTANCE_COUNT,
            ),
            concurrency: Bounds::new(
                DEFAULT_RUN_CONFIG_MIN_CONCURRENCY,
                DEFAULT_RUN_CONFIG_MAX_CONCURRENCY,
            ),
            concurrency_list: Vec::new(),
            batch_sizes: vec![1],
            request_count_multiplier: DEFAULT_REQUEST_COUNT_MULTIPLIER,
            early_exit_enable: false,
            early_exit_window: DEFAULT_EARLY_EXIT_WINDOW,
            min_throughput_gain: DEFAULT_MIN_THROUGHPUT_GAIN,
            top_n: DEFAULT_NUM_CONFIGS_PER_MODEL,
        }
    }
}

impl SearchConfig {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self {
            models,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_concurrency(mut self, min: u32, max: u32) -> Self {
        self.concurrency = Bounds::new(min, max);
        self
    }

    pub fn with_early_exit(mut self, enable: bool) -> Self {
        self.early_exit_enable = enable;
        self
    }

    pub fn with_model_batch_size(mut self, min: u32, max: u32) -> Self {
        self.model_batch_size = Bounds::new(min, max);
        self
    }

    pub fn with_instance_count(mut self, min: u32, max: u32) -> Self {
        self.instance_count = Bounds::new(min, max);
        self
    }

    pub fn from_json_str(json: &str) -> MsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> MsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn model_batch_size_bounds(&self, model_index: usize) -> Bounds {
        self.models[model_index]
            .model_batch_size
            .unwrap_or(self.model_batch_size)
    }

    pub fn instance_count_bounds(&self, model_index: usize) -> Bounds {
        self.models[model_index]
            .instance_count
            .unwrap_or(self.instance_count)
    }

    /// Two dimensions per model: `max_batch_size` (exponential) then
    /// `instance_count` (linear).
    pub fn dimensions(&self) -> Vec<SearchDimension> {
        let mut dimensions = Vec::with_capacity(self.models.len() * 2);
        for (i, model) in self.models.iter().enumerate() {
            let batch = self.model_batch_size_bounds(i);
            let instances = self.instance_count_bounds(i);
            dimensions.push(SearchDimension::exponential(
                format!("{}.max_batch_size", model.name),
                i64::from(batch.min.max(1).ilog2()),
                i64::from(batch.max.max(1).ilog2()),
            ));
            dimensions.push(SearchDimension::linear(
                format!("{}.instance_count", model.name),
                i64::from(instances.min) - 1,
                i64::from(instances.max) - 1,
            ));
        }
        dimensions
    }

    pub fn neighborhood_config(&self) -> NeighborhoodConfig {
        NeighborhoodConfig::new(self.dimensions(), self.radius, self.min_initialized)
    }

    pub fn validate(&self) -> MsResult<()> {
        if self.models.is_empty() {
            return Err(validation_error!("no models to profile"));
        }
        let mut names = HashSet::new();
        for (i, model) in self.models.iter().enumerate() {
            if model.name.is_empty() {
                return Err(validation_error!("model {i} has an empty name"));
            }
            if !names.insert(model.name.as_str()) {
                return Err(validation_error!(
                    "model {} listed more than once",
                    model.name
                ));
            }
            let batch = self.model_batch_size_bounds(i);
            batch.validate(&format!("{} model batch size", model.name))?;
            if !batch.min.is_power_of_two() || !batch.max.is_power_of_two() {
                return Err(validation_error!(
                    "{} model batch size bounds must be powers of two, got [{}, {}]",
                    model.name, batch.min, batch.max
                ));
            }
            self.instance_count_bounds(i)
                .validate(&format!("{} instance count", model.name))?;
        }

        self.concurrency.validate("concurrency")?;
        if self.concurrency_list.contains(&0) {
            return Err(validation_error!("concurrency values must be positive"));
        }
        if self.batch_sizes.is_empty() || self.batch_sizes.contains(&0) {
            return Err(validation_error!(
                "batch sizes must be a non-empty list of positive values"
            ));
        }
        if self.radius < 0 {
            return Err(validation_error!("radius {} is negative", self.radius));
        }
        if self.request_count_multiplier == 0 {
            return Err(validation_error!("request count multiplier must be at least 1"));
        }
        if self.early_exit_window < 2 {
            return Err(validation_error!(
                "early exit window {} is shorter than 2 samples",
                self.early_exit_window
            ));
        }
        if !self.min_throughput_gain.is_finite() || self.min_throughput_gain < 0.0 {
            return Err(validation_error!(
                "minimum throughput gain {} must be a non-negative number",
                self.min_throughput_gain
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionKind;
    use crate::errors::MsError;

    fn sample_config() -> SearchConfig {
        SearchConfig::new(vec![ModelSpec::new("resnet50")])
    }

    #[test]
    fn defaults() {
        let config = sample_config();
        assert_eq!(config.radius, 3);
        assert_eq!(config.min_initialized, 3);
        assert_eq!(config.concurrency, Bounds::new(1, 1024));
        assert_eq!(config.top_n, 3);
        assert_eq!(config.mode, SearchMode::QuickPlusSweep);
        assert!(!config.early_exit_enable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dimensions_per_model() {
        let mut config = SearchConfig::new(vec![ModelSpec::new("a"), ModelSpec::new("b")])
            .with_model_batch_size(2, 64)
            .with_instance_count(1, 3);
        config.models[1].instance_count = Some(Bounds::fixed(2));

        let dims = config.dimensions();
        assert_eq!(dims.len(), 4);
        assert_eq!(dims[0].kind, DimensionKind::Exponential);
        assert_eq!((dims[0].min_index, dims[0].max_index), (1, 6));
        assert_eq!(dims[1].kind, DimensionKind::Linear);
        assert_eq!((dims[1].min_index, dims[1].max_index), (0, 2));
        assert_eq!((dims[3].min_index, dims[3].max_index), (1, 1));
        assert_eq!(dims[3].name, "b.instance_count");

        let neighborhood = config.neighborhood_config();
        assert_eq!(neighborhood.num_dimensions(), 4);
        assert_eq!(neighborhood.radius, 3);
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = SearchConfig::from_json_str(
            r#"{
                "models": [{"name": "bert", "default_max_batch_size": 8}],
                "mode": "brute",
                "concurrency": {"min": 2, "max": 32}
            }"#,
        )
        .unwrap();

        assert_eq!(config.mode, SearchMode::Brute);
        assert_eq!(config.models[0].default_max_batch_size, 8);
        assert_eq!(config.models[0].default_instance_count, 1);
        assert_eq!(config.concurrency, Bounds::new(2, 32));
        assert_eq!(config.batch_sizes, vec![1]);
        assert_eq!(config.request_count_multiplier, DEFAULT_REQUEST_COUNT_MULTIPLIER);
    }

    #[test]
    fn from_json_rejects_invalid() {
        let err = SearchConfig::from_json_str(r#"{"models": []}"#).unwrap_err();
        assert!(matches!(err, MsError::Validation(_)));

        let err = SearchConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, MsError::Serialization(_)));
    }

    #[test]
    fn validation_rules() {
        assert!(sample_config().with_model_batch_size(3, 8).validate().is_err());
        assert!(sample_config().with_concurrency(8, 4).validate().is_err());
        assert!(sample_config().with_concurrency(0, 4).validate().is_err());
        assert!(sample_config().with_instance_count(0, 2).validate().is_err());

        let mut config = sample_config();
        config.early_exit_window = 1;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.batch_sizes.clear();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.models.push(ModelSpec::new("resnet50"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_json_file_reads_disk() {
        let path = std::env::temp_dir().join(format!(
            "ms-types-config-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"models": [{"name": "m"}], "top_n": 5}"#).unwrap();
        let config = SearchConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.top_n, 5);

        let missing = SearchConfig::from_json_file(path).unwrap_err();
        assert!(matches!(missing, MsError::Io(_)));
    }
}
