//! Measurements fed back into the search and the ordering contract the
//! search relies on.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;

/// A measurement of one candidate configuration.
///
/// `compare_*` return signed weights: positive when `other` is better than
/// `self`, negative when worse, zero when equivalent. Both must be
/// antisymmetric (`a.cmp(b) == -b.cmp(a)`) so that "best of" selection
/// is well defined.
pub trait Measurement: Clone + Debug {
    /// Whether the measurement satisfies every configured constraint.
    fn is_passing_constraints(&self) -> bool;

    /// Weighted comparison of the optimization objectives.
    fn compare_measurements(&self, other: &Self) -> f64;

    /// How much closer `other` is to satisfying the constraints than `self`.
    fn compare_constraints(&self, other: &Self) -> f64;

    /// Primary throughput figure (inferences per second).
    fn throughput(&self) -> f64;

    /// Total order derived from [`compare_measurements`](Self::compare_measurements).
    /// `Greater` means `self` ranks above `other`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        let weight = self.compare_measurements(other);
        if weight > 0.0 {
            Ordering::Less
        } else if weight < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

/// Acceptance thresholds a measurement must meet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub min_throughput: Option<f64>,
    pub max_p99_latency_ms: Option<f64>,
}

impl Constraints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_latency(mut self, max_p99_latency_ms: f64) -> Self {
        self.max_p99_latency_ms = Some(max_p99_latency_ms);
        self
    }

    pub fn with_min_throughput(mut self, min_throughput: f64) -> Self {
        self.min_throughput = Some(min_throughput);
        self
    }
}

/// Relative weights of the optimization objectives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Objectives {
    pub throughput: f64,
    pub latency: f64,
}

impl Default for Objectives {
    fn default() -> Self {
        Self {
            throughput: 1.0,
            latency: 0.0,
        }
    }
}

/// Throughput/latency measurement reported by a profiling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfMeasurement {
    /// Inferences per second.
    pub throughput: f64,
    pub p99_latency_ms: f64,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub objectives: Objectives,
}

impl PerfMeasurement {
    pub fn new(throughput: f64, p99_latency_ms: f64) -> Self {
        Self {
            throughput,
            p99_latency_ms,
            constraints: Constraints::default(),
            objectives: Objectives::default(),
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

    fn throughput_deficit(&self) -> f64 {
        self.constraints
            .min_throughput
            .map_or(0.0, |min| (min - self.throughput).max(0.0))
    }

    fn latency_excess(&self) -> f64 {
        self.constraints
            .max_p99_latency_ms
            .map_or(0.0, |max| (self.p99_latency_ms - max).max(0.0))
    }
}

/// (candidate - base) relative to their mean.
fn relative_gain(base: f64, candidate: f64) -> f64 {
    let mean = (base + candidate) / 2.0;
    if mean == 0.0 {
        0.0
    } else {
        (candidate - base) / mean
    }
}

/// Mean of the positive thresholds set on either side.
fn shared_scale(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    let values: Vec<f64> = [a, b].into_iter().flatten().filter(|v| *v > 0.0).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl Measurement for PerfMeasurement {
    fn is_passing_constraints(&self) -> bool {
        self.throughput_deficit() == 0.0 && self.latency_excess() == 0.0
    }

    fn compare_measurements(&self, other: &Self) -> f64 {
        // Both sides' objectives are averaged.
        let throughput_weight = (self.objectives.throughput + other.objectives.throughput) / 2.0;
        let latency_weight = (self.objectives.latency + other.objectives.latency) / 2.0;
        let total = throughput_weight + latency_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let throughput = relative_gain(self.throughput, other.throughput);
        // lower latency is better
        let latency = relative_gain(other.p99_latency_ms, self.p99_latency_ms);
        (throughput_weight * throughput + latency_weight * latency) / total
    }

    fn compare_constraints(&self, other: &Self) -> f64 {
        let mut weight = 0.0;
        let min_throughput = shared_scale(
            self.constraints.min_throughput,
            other.constraints.min_throughput,
        );
        if let Some(min) = min_throughput {
            weight += (self.throughput_deficit() - other.throughput_deficit()) / min;
        }
        let max_latency = shared_scale(
            self.constraints.max_p99_latency_ms,
            other.constraints.max_p99_latency_ms,
        );
        if let Some(max) = max_latency {
            weight += (self.latency_excess() - other.latency_excess()) / max;
        }
        weight
    }

    fn throughput(&self) -> f64 {
        self.throughput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_throughput_is_better() {
        let slow = PerfMeasurement::new(100.0, 10.0);
        let fast = PerfMeasurement::new(300.0, 10.0);

        assert!(slow.compare_measurements(&fast) > 0.0);
        assert!(fast.compare_measurements(&slow) < 0.0);
        assert_eq!(
            slow.compare_measurements(&fast),
            -fast.compare_measurements(&slow)
        );
        assert_eq!(fast.rank_cmp(&slow), Ordering::Greater);
        assert_eq!(slow.rank_cmp(&slow.clone()), Ordering::Equal);
    }

    #[test]
    fn latency_objective_prefers_lower_latency() {
        let objectives = Objectives {
            throughput: 0.0,
            latency: 1.0,
        };
        let a = PerfMeasurement::new(100.0, 20.0).with_objectives(objectives);
        let b = PerfMeasurement::new(50.0, 5.0).with_objectives(objectives);
        assert!(a.compare_measurements(&b) > 0.0);
        assert_eq!(b.rank_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn constraint_checks() {
        let constraints = Constraints::none()
            .with_max_latency(50.0)
            .with_min_throughput(100.0);

        assert!(PerfMeasurement::new(150.0, 40.0)
            .with_constraints(constraints)
            .is_passing_constraints());
        assert!(!PerfMeasurement::new(150.0, 60.0)
            .with_constraints(constraints)
            .is_passing_constraints());
        assert!(!PerfMeasurement::new(90.0, 40.0)
            .with_constraints(constraints)
            .is_passing_constraints());
        assert!(PerfMeasurement::new(1.0, 1000.0).is_passing_constraints());
    }

    #[test]
    fn compare_constraints_points_toward_satisfaction() {
        let constraints = Constraints::none().with_max_latency(50.0);
        let far = PerfMeasurement::new(100.0, 150.0).with_constraints(constraints);
        let near = PerfMeasurement::new(100.0, 75.0).with_constraints(constraints);
        let passing = PerfMeasurement::new(100.0, 40.0).with_constraints(constraints);

        assert!(far.compare_constraints(&near) > 0.0);
        assert!(near.compare_constraints(&far) < 0.0);
        assert!(far.compare_constraints(&passing) > far.compare_constraints(&near));
        assert_eq!(passing.compare_constraints(&passing.clone()), 0.0);
    }

    #[test]
    fn mixed_objectives_stay_antisymmetric() {
        let a = PerfMeasurement::new(100.0, 20.0);
        let b = PerfMeasurement::new(150.0, 40.0).with_objectives(Objectives {
            throughput: 0.0,
            latency: 1.0,
        });
        let forward = a.compare_measurements(&b);
        assert!(forward != 0.0);
        assert!((forward + b.compare_measurements(&a)).abs() < 1e-12);
        assert_eq!(a.rank_cmp(&b), b.rank_cmp(&a).reverse());
    }

    #[test]
    fn mixed_constraints_stay_antisymmetric() {
        let a = PerfMeasurement::new(100.0, 80.0)
            .with_constraints(Constraints::none().with_max_latency(50.0));
        let b = PerfMeasurement::new(100.0, 120.0)
            .with_constraints(Constraints::none().with_max_latency(100.0));
        let forward = a.compare_constraints(&b);
        assert!(forward != 0.0);
        assert!((forward + b.compare_constraints(&a)).abs() < 1e-12);
    }

    #[test]
    fn zero_measurements_compare_equal() {
        let a = PerfMeasurement::new(0.0, 0.0);
        assert_eq!(a.compare_measurements(&a.clone()), 0.0);
    }
}
