//! Hill-climbing search over model variants.
//!
//! Each model contributes two grid axes, `max_batch_size` (exponential) and
//! `instance_count` (linear). The search starts at the lowest corner of the
//! grid and moves its home coordinate using [`Neighborhood`] until a
//! slow-mode confirmation finds nothing better around home.

use ms_types::{
    Coordinate, Measurement, ModelRunConfig, ModelVariant, MsResult, NeighborhoodConfig,
    PerfConfig, RunConfig, SearchConfig,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::coordinate_data::CoordinateData;
use crate::generator::{best_by_rank, exhausted, unexpected_feedback, ConfigGenerator};
use crate::neighborhood::Neighborhood;

enum Decision {
    Measure(Coordinate),
    Move(Coordinate),
    ForceSlowMode,
    Finish,
}

pub struct QuickRunConfigGenerator<M> {
    search_config: SearchConfig,
    neighborhood_config: NeighborhoodConfig,
    data: CoordinateData<M>,
    home: Coordinate,
    force_slow_mode: bool,
    coordinate_to_measure: Coordinate,
    homes_visited: HashSet<Coordinate>,
    awaiting_feedback: bool,
    done: bool,
    home_moves: usize,
}

impl<M: Measurement> QuickRunConfigGenerator<M> {
    pub fn new(config: &SearchConfig) -> Self {
        let neighborhood_config = config.neighborhood_config();
        let home = Coordinate::new(
            neighborhood_config
                .dimensions
                .iter()
                .map(|d| d.min_index)
                .collect(),
        );
        info!(
            dimensions = neighborhood_config.num_dimensions(),
            radius = neighborhood_config.radius,
            "Starting quick search"
        );

        Self {
            search_config: config.clone(),
            done: config.models.is_empty(),
            neighborhood_config,
            data: CoordinateData::new(),
            coordinate_to_measure: home.clone(),
            homes_visited: HashSet::from([home.clone()]),
            home,
            force_slow_mode: false,
            awaiting_feedback: false,
            home_moves: 0,
        }
    }

    pub fn home(&self) -> &Coordinate {
        &self.home
    }

    pub fn coordinate_data(&self) -> &CoordinateData<M> {
        &self.data
    }

    /// How many times home has moved.
    pub fn home_moves(&self) -> usize {
        self.home_moves
    }

    /// The run configuration a grid coordinate stands for.
    ///
    /// Client concurrency is `2 × max_batch_size × instance_count`, clamped
    /// to the configured concurrency bounds.
    pub fn coordinate_to_run_config(&self, coordinate: &Coordinate) -> RunConfig {
        let concurrency_bounds = self.search_config.concurrency;
        let batch_size = self.search_config.batch_sizes.first().copied().unwrap_or(1);

        let models = self
            .search_config
            .models
            .iter()
            .enumerate()
            .map(|(i, model)| {
                let max_batch_size =
                    grid_value(&self.neighborhood_config, coordinate, 2 * i);
                let instance_count =
                    grid_value(&self.neighborhood_config, coordinate, 2 * i + 1);
                let concurrency = max_batch_size
                    .saturating_mul(instance_count)
                    .saturating_mul(2)
                    .clamp(concurrency_bounds.min, concurrency_bounds.max);

                ModelRunConfig {
                    model_name: model.name.clone(),
                    variant: ModelVariant::new(max_batch_size, instance_count),
                    perf: PerfConfig {
                        batch_size,
                        concurrency,
                        request_count: self
                            .search_config
                            .request_count_multiplier
                            .saturating_mul(concurrency),
                    },
                }
            })
            .collect();
        RunConfig::new(models)
    }

    fn advance(&mut self) -> MsResult<()> {
        loop {
            if !self.data.is_measured(&self.home) {
                if self.data.is_visited(&self.home) {
                    warn!(
                        home = %self.home,
                        "Home configuration could not be measured, ending quick search"
                    );
                    self.done = true;
                } else {
                    self.coordinate_to_measure = self.home.clone();
                }
                return Ok(());
            }

            match self.decide()? {
                Decision::Measure(coordinate) => {
                    self.coordinate_to_measure = coordinate;
                    return Ok(());
                }
                Decision::Move(new_home) => self.move_home(new_home),
                Decision::ForceSlowMode => {
                    debug!(home = %self.home, "Confirming home in slow mode");
                    self.force_slow_mode = true;
                }
                Decision::Finish => {
                    info!(home = %self.home, moves = self.home_moves, "Quick search converged");
                    self.done = true;
                    return Ok(());
                }
            }
        }
    }

    fn decide(&self) -> MsResult<Decision> {
        let mut neighborhood =
            Neighborhood::new(&self.neighborhood_config, &self.data, self.home.clone())?;
        if self.force_slow_mode {
            neighborhood.force_slow_mode();
        }

        if neighborhood.enough_coordinates_initialized() {
            return self.step(&neighborhood);
        }
        match neighborhood.pick_coordinate_to_initialize()? {
            Some(coordinate) => Ok(Decision::Measure(coordinate)),
            None => self.step(&neighborhood),
        }
    }

    fn step(&self, neighborhood: &Neighborhood<'_, M>) -> MsResult<Decision> {
        let slow_mode = neighborhood.is_slow_mode();
        let new_home = neighborhood.determine_new_home()?;

        if new_home == self.home {
            return Ok(if slow_mode {
                Decision::Finish
            } else {
                Decision::ForceSlowMode
            });
        }
        // fast-mode steps never return to a former home or a failed point
        let failed = self.data.is_visited(&new_home) && !self.data.is_measured(&new_home);
        if !slow_mode && (self.homes_visited.contains(&new_home) || failed) {
            return Ok(Decision::ForceSlowMode);
        }
        Ok(Decision::Move(new_home))
    }

    fn move_home(&mut self, new_home: Coordinate) {
        debug!(from = %self.home, to = %new_home, "Moving home");
        self.homes_visited.insert(new_home.clone());
        self.home = new_home;
        self.force_slow_mode = false;
        self.home_moves += 1;
    }
}

fn grid_value(config: &NeighborhoodConfig, coordinate: &Coordinate, dim: usize) -> u32 {
    let value = config.dimension(dim).value_at(coordinate[dim]);
    u32::try_from(value.max(1)).unwrap_or(u32::MAX)
}

impl<M: Measurement> ConfigGenerator<M> for QuickRunConfigGenerator<M> {
    type Config = RunConfig;

    fn name(&self) -> &str {
        "quick"
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn next_config(&mut self) -> MsResult<RunConfig> {
        if self.done {
            return Err(exhausted("quick"));
        }
        if self.awaiting_feedback {
            return Err(unexpected_feedback(
                "quick",
                "next configuration requested before results of the previous one",
            ));
        }
        self.awaiting_feedback = true;
        Ok(self.coordinate_to_run_config(&self.coordinate_to_measure))
    }

    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()> {
        if !self.awaiting_feedback {
            return Err(unexpected_feedback("quick", "no configuration pending"));
        }
        self.awaiting_feedback = false;

        let measurement = best_by_rank(measurements);
        if measurement.is_none() {
            debug!(coordinate = %self.coordinate_to_measure, "Measurement failed");
        }
        self.data.record(&self.coordinate_to_measure, measurement);
        self.advance()
    }
}
