//! Memory of the hill-climbing search: what was measured where.

use ms_types::Coordinate;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CoordinateEntry<M> {
    visit_count: u32,
    measurement: Option<M>,
}

/// Per-coordinate visit counts and measurements.
///
/// Entries are only added through [`record`](Self::record), which is the
/// feedback path, and are never removed.
#[derive(Debug, Clone)]
pub struct CoordinateData<M> {
    entries: HashMap<Coordinate, CoordinateEntry<M>>,
}

impl<M> CoordinateData<M> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record one completed measurement attempt at `coordinate`.
    ///
    /// The visit count always goes up by one. A `None` measurement (failed
    /// profiling run) keeps whatever was measured there before.
    pub fn record(&mut self, coordinate: &Coordinate, measurement: Option<M>) {
        let entry = self
            .entries
            .entry(coordinate.clone())
            .or_insert(CoordinateEntry {
                visit_count: 0,
                measurement: None,
            });
        entry.visit_count += 1;
        if measurement.is_some() {
            entry.measurement = measurement;
        }
    }

    pub fn get_measurement(&self, coordinate: &Coordinate) -> Option<&M> {
        self.entries.get(coordinate)?.measurement.as_ref()
    }

    pub fn get_visit_count(&self, coordinate: &Coordinate) -> u32 {
        self.entries.get(coordinate).map_or(0, |e| e.visit_count)
    }

    pub fn is_visited(&self, coordinate: &Coordinate) -> bool {
        self.get_visit_count(coordinate) > 0
    }

    pub fn is_measured(&self, coordinate: &Coordinate) -> bool {
        self.get_measurement(coordinate).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M> Default for CoordinateData<M> {
    fn default() -> Self {
        Self::new()
    }
}
