//! Candidate configurations handed to the profiler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side model configuration for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelVariant {
    pub max_batch_size: u32,
    pub instance_count: u32,
    /// The model's own, unmodified configuration.
    #[serde(default)]
    pub is_default: bool,
}

impl ModelVariant {
    pub fn new(max_batch_size: u32, instance_count: u32) -> Self {
        Self {
            max_batch_size,
            instance_count,
            is_default: false,
        }
    }

    pub fn default_config(max_batch_size: u32, instance_count: u32) -> Self {
        Self {
            max_batch_size,
            instance_count,
            is_default: true,
        }
    }
}

/// Client-side load parameters for one profiling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerfConfig {
    pub batch_size: u32,
    pub concurrency: u32,
    /// Number of requests the profiler should sample.
    pub request_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRunConfig {
    pub model_name: String,
    pub variant: ModelVariant,
    pub perf: PerfConfig,
}

/// One candidate: a configuration for every model being profiled together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunConfig {
    pub models: Vec<ModelRunConfig>,
}

impl RunConfig {
    pub fn new(models: Vec<ModelRunConfig>) -> Self {
        Self { models }
    }

    /// Identifies the model-config combination, ignoring client load.
    pub fn variant_key(&self) -> String {
        self.models
            .iter()
            .map(|m| {
                if m.variant.is_default {
                    format!("{}_config_default", m.model_name)
                } else {
                    format!(
                        "{}_bs{}_ic{}",
                        m.model_name, m.variant.max_batch_size, m.variant.instance_count
                    )
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is_default(&self) -> bool {
        self.models.iter().all(|m| m.variant.is_default)
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.models.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "{}: max_batch_size={} instances={}{} batch={} concurrency={}",
                m.model_name,
                m.variant.max_batch_size,
                m.variant.instance_count,
                if m.variant.is_default { " (default)" } else { "" },
                m.perf.batch_size,
                m.perf.concurrency
            )?;
        }
        Ok(())
    }
}
