//! Neighborhood of a home coordinate: which nearby points to measure next
//! and where to move once enough of them are known.
//!
//! A neighborhood runs in one of two modes, derived fresh on every call:
//!
//! - **fast** (exploration): home and every measured neighbor agree on
//!   whether they pass the constraints. The next home is found by a
//!   weighted step toward better neighbors.
//! - **slow** (confirmation): the neighborhood straddles the constraint
//!   boundary, or slow mode was forced. Every axis-adjacent neighbor is
//!   measured and the best passing point becomes the next home.

use ms_types::{Coordinate, Measurement, MsResult, NeighborhoodConfig, SearchError};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::coordinate_data::CoordinateData;

/// Step-size thresholds: a raw step whose magnitude exceeds the i-th bound
/// moves `i + 1` grid points.
pub const TRANSLATION_LIST: [f64; 3] = [0.09, 0.3, 1.0];

/// Coordinates within `radius` of a home coordinate, plus the logic to
/// explore and exploit them.
///
/// Rebuilt whenever home changes; forcing slow mode only lasts for the
/// lifetime of one instance.
#[derive(Debug)]
pub struct Neighborhood<'a, M> {
    config: &'a NeighborhoodConfig,
    data: &'a CoordinateData<M>,
    home: Coordinate,
    neighborhood: Vec<Coordinate>,
    force_slow_mode: bool,
}

impl<'a, M: Measurement> Neighborhood<'a, M> {
    pub fn new(
        config: &'a NeighborhoodConfig,
        data: &'a CoordinateData<M>,
        home: Coordinate,
    ) -> MsResult<Self> {
        if home.len() != config.num_dimensions() {
            return Err(SearchError::DimensionMismatch {
                expected: config.num_dimensions(),
                actual: home.len(),
            }
            .into());
        }
        let outside = (0..home.len()).find(|&dim| !config.dimension(dim).contains(home[dim]));
        if let Some(dimension) = outside {
            return Err(SearchError::OutOfBounds {
                coordinate: home.to_string(),
                dimension,
            }
            .into());
        }
        let neighborhood = create_neighborhood(config, &home, config.radius);
        Ok(Self {
            config,
            data,
            home,
            neighborhood,
            force_slow_mode: false,
        })
    }

    /// Euclidean distance between two coordinates.
    pub fn calc_distance(coordinate1: &Coordinate, coordinate2: &Coordinate) -> f64 {
        coordinate1.distance(coordinate2)
    }

    pub fn home(&self) -> &Coordinate {
        &self.home
    }

    /// Every coordinate in the neighborhood, home included, in enumeration
    /// order.
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.neighborhood
    }

    pub fn force_slow_mode(&mut self) {
        self.force_slow_mode = true;
    }

    /// Whether enough of the neighborhood is known to take a step.
    ///
    /// Slow mode needs every adjacent neighbor visited; fast mode needs
    /// `min_initialized` measured non-home neighbors.
    pub fn enough_coordinates_initialized(&self) -> bool {
        if self.is_slow_mode() {
            self.are_all_adjacent_neighbors_visited()
        } else {
            self.initialized_coordinates().count() >= self.config.min_initialized
        }
    }

    pub fn is_slow_mode(&self) -> bool {
        if self.force_slow_mode {
            return true;
        }
        let Some(home_measurement) = self.home_measurement() else {
            return false;
        };

        let visited = self.visited_measurements();
        let any_failing = visited.iter().any(|(_, m)| !m.is_passing_constraints());
        let any_passing = visited.iter().any(|(_, m)| m.is_passing_constraints());
        let home_passing = home_measurement.is_passing_constraints();

        (home_passing && any_failing) || (!home_passing && any_passing)
    }

    pub fn is_home_passing_constraints(&self) -> MsResult<bool> {
        self.home_measurement()
            .map(|m| m.is_passing_constraints())
            .ok_or_else(|| self.home_not_measured())
    }

    /// Where the search should move next.
    ///
    /// Slow mode returns the best confirmed coordinate; fast mode steps
    /// along the weighted direction of the measured neighbors.
    pub fn determine_new_home(&self) -> MsResult<Coordinate> {
        if self.is_slow_mode() {
            Ok(self.best_coordinate_found())
        } else {
            self.calculate_new_home()
        }
    }

    /// Pick an unvisited coordinate to measure next.
    ///
    /// Slow mode walks the adjacent neighbors and fails if none is left;
    /// fast mode returns `None` once the neighborhood is exhausted.
    pub fn pick_coordinate_to_initialize(&self) -> MsResult<Option<Coordinate>> {
        if self.is_slow_mode() {
            self.pick_slow_mode_coordinate_to_initialize().map(Some)
        } else {
            Ok(self.pick_fast_mode_coordinate_to_initialize())
        }
    }

    /// Nearest coordinate in the neighborhood; the first one enumerated
    /// wins ties.
    pub fn get_nearest_neighbor(&self, coordinate: &Coordinate) -> Option<Coordinate> {
        let mut min_distance = f64::INFINITY;
        let mut nearest = None;
        for candidate in &self.neighborhood {
            let distance = Self::calc_distance(candidate, coordinate);
            if distance < min_distance {
                min_distance = distance;
                nearest = Some(candidate);
            }
        }
        nearest.cloned()
    }

    fn pick_slow_mode_coordinate_to_initialize(&self) -> MsResult<Coordinate> {
        self.adjacent_neighbors()
            .into_iter()
            .find(|neighbor| !self.data.is_visited(neighbor))
            .ok_or_else(|| {
                SearchError::NoUnvisitedNeighbor {
                    home: self.home.to_string(),
                }
                .into()
            })
    }

    fn pick_fast_mode_coordinate_to_initialize(&self) -> Option<Coordinate> {
        let covered = self.covered_values_per_dimension();

        let mut max_uncovered = None;
        let mut best = None;
        for coordinate in &self.neighborhood {
            if self.data.is_visited(coordinate) {
                continue;
            }
            let uncovered = coordinate
                .iter()
                .enumerate()
                .filter(|(dim, v)| !covered[*dim].contains(v))
                .count();
            if max_uncovered.map_or(true, |max| uncovered > max) {
                max_uncovered = Some(uncovered);
                best = Some(coordinate);
            }
        }
        best.cloned()
    }

    fn covered_values_per_dimension(&self) -> Vec<HashSet<i64>> {
        let mut covered = vec![HashSet::new(); self.config.num_dimensions()];
        for coordinate in self.visited_coordinates() {
            for (dim, v) in coordinate.iter().enumerate() {
                covered[dim].insert(*v);
            }
        }
        covered
    }

    fn best_coordinate_found(&self) -> Coordinate {
        let passing: Vec<_> = self
            .visited_measurements()
            .into_iter()
            .filter(|(_, m)| m.is_passing_constraints())
            .collect();
        if passing.is_empty() {
            return self.home.clone();
        }

        let origin = Coordinate::zeros(self.config.num_dimensions());
        let mut candidates = Vec::with_capacity(passing.len() + 1);
        if let Some(home) = self.home_measurement().filter(|m| m.is_passing_constraints()) {
            candidates.push((origin.clone(), home));
        }
        candidates.extend(passing);

        // Equal measurements fall back to distance from home, then to
        // enumeration order.
        let mut best = &candidates[0];
        for candidate in &candidates[1..] {
            let better = match candidate.1.rank_cmp(best.1) {
                Ordering::Greater => true,
                Ordering::Equal => candidate.0.distance(&origin) < best.0.distance(&origin),
                Ordering::Less => false,
            };
            if better {
                best = candidate;
            }
        }
        &self.home + &best.0
    }

    fn calculate_new_home(&self) -> MsResult<Coordinate> {
        let step_vector = self.step_vector()?;
        let step = translate_step_vector(&step_vector, &TRANSLATION_LIST);
        Ok(self.clamp_coordinate_to_bounds(&(&self.home + &step)))
    }

    fn step_vector(&self) -> MsResult<Vec<f64>> {
        let home_measurement = self.home_measurement().ok_or_else(|| self.home_not_measured())?;
        let compare_constraints = !home_measurement.is_passing_constraints();

        let visited = self.visited_measurements();
        let passing = visited
            .iter()
            .filter(|(_, m)| m.is_passing_constraints())
            .count();
        assert!(
            passing == 0 || passing == visited.len(),
            "weighted step over a neighborhood that straddles the constraint boundary"
        );

        let (vectors, weights): (Vec<_>, Vec<_>) = visited
            .into_iter()
            .map(|(vector, m)| {
                let weight = if compare_constraints {
                    home_measurement.compare_constraints(m)
                } else {
                    home_measurement.compare_measurements(m)
                };
                (vector, weight)
            })
            .unzip();

        Ok(step_vector_from_weights(
            &vectors,
            &weights,
            self.config.num_dimensions(),
        ))
    }

    fn clamp_coordinate_to_bounds(&self, coordinate: &Coordinate) -> Coordinate {
        Coordinate::new(
            coordinate
                .iter()
                .enumerate()
                .map(|(dim, v)| self.config.dimension(dim).clamp(*v))
                .collect(),
        )
    }

    /// Visited neighborhood coordinates other than home.
    fn visited_coordinates(&self) -> impl Iterator<Item = &Coordinate> + '_ {
        self.neighborhood
            .iter()
            .filter(move |c| **c != self.home && self.data.is_visited(c))
    }

    /// Measured neighborhood coordinates other than home.
    fn initialized_coordinates(&self) -> impl Iterator<Item = &Coordinate> + '_ {
        self.neighborhood
            .iter()
            .filter(move |c| **c != self.home && self.data.is_measured(c))
    }

    /// (vector from home, measurement) for every measured non-home neighbor.
    fn visited_measurements(&self) -> Vec<(Coordinate, &'a M)> {
        let data = self.data;
        self.visited_coordinates()
            .filter_map(|c| data.get_measurement(c).map(|m| (c - &self.home, m)))
            .collect()
    }

    /// The 2×dimensions axis neighbors of home, down before up per
    /// dimension, clipped to bounds.
    fn adjacent_neighbors(&self) -> Vec<Coordinate> {
        let mut neighbors = Vec::with_capacity(2 * self.config.num_dimensions());
        for (dim, dimension) in self.config.dimensions.iter().enumerate() {
            let down = self.home[dim] - 1;
            if down >= dimension.min_index {
                neighbors.push(self.home.with_value(dim, down));
            }
            let up = self.home[dim] + 1;
            if up <= dimension.max_index {
                neighbors.push(self.home.with_value(dim, up));
            }
        }
        neighbors
    }

    fn are_all_adjacent_neighbors_visited(&self) -> bool {
        self.adjacent_neighbors()
            .iter()
            .all(|neighbor| self.data.is_visited(neighbor))
    }

    fn home_measurement(&self) -> Option<&'a M> {
        self.data.get_measurement(&self.home)
    }

    fn home_not_measured(&self) -> ms_types::MsError {
        SearchError::HomeNotMeasured {
            home: self.home.to_string(),
        }
        .into()
    }
}

/// Grid points inside both the radius ball and the dimension bounds.
/// The lowest dimension varies slowest.
fn create_neighborhood(
    config: &NeighborhoodConfig,
    home: &Coordinate,
    radius: i64,
) -> Vec<Coordinate> {
    let mut result: Vec<Vec<i64>> = vec![Vec::new()];
    for (dim, dimension) in config.dimensions.iter().enumerate() {
        let low = dimension.min_index.max(home[dim] - radius);
        let high = dimension.max_index.min(home[dim] + radius);
        let mut next = Vec::with_capacity(result.len() * (high - low + 1).max(0) as usize);
        for existing in &result {
            for v in low..=high {
                let mut values = existing.clone();
                values.push(v);
                next.push(values);
            }
        }
        result = next;
    }

    result
        .into_iter()
        .map(Coordinate::new)
        .filter(|c| c.distance(home) <= radius as f64)
        .collect()
}

/// Per dimension: sum of weights of every vector moving along it (negated
/// for negative moves), divided by the summed magnitude of those moves.
pub(crate) fn step_vector_from_weights(
    vectors: &[Coordinate],
    weights: &[f64],
    num_dimensions: usize,
) -> Vec<f64> {
    let mut step = vec![0.0; num_dimensions];
    let mut magnitude = vec![0.0; num_dimensions];

    for (vector, weight) in vectors.iter().zip(weights) {
        for (dim, v) in vector.iter().enumerate() {
            match v.cmp(&0) {
                Ordering::Greater => {
                    step[dim] += weight;
                    magnitude[dim] += *v as f64;
                }
                Ordering::Less => {
                    step[dim] -= weight;
                    magnitude[dim] -= *v as f64;
                }
                Ordering::Equal => {}
            }
        }
    }

    for (s, m) in step.iter_mut().zip(&magnitude) {
        if *m != 0.0 {
            *s /= m;
        }
    }
    step
}

pub(crate) fn translate_step_vector(step_vector: &[f64], translation_list: &[f64]) -> Coordinate {
    Coordinate::new(
        step_vector
            .iter()
            .map(|v| translate_value(*v, translation_list))
            .collect(),
    )
}

fn translate_value(value: f64, translation_list: &[f64]) -> i64 {
    let mut ret = 0;
    for (index, bound) in translation_list.iter().enumerate() {
        if value > *bound {
            ret = index as i64 + 1;
        }
        if value < -bound {
            ret = -(index as i64 + 1);
        }
    }
    ret
}
