//! The pull-based generator protocol shared by every search strategy.
//!
//! A caller asks for one candidate with [`ConfigGenerator::next_config`],
//! measures it, and hands the result back with
//! [`ConfigGenerator::set_last_results`] before asking again. Strategies
//! can be concatenated with [`Chain`].

use ms_types::{Measurement, MsError, MsResult, SearchError};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt::Debug;

/// Common trait for all configuration generators.
pub trait ConfigGenerator<M: Measurement> {
    /// The candidate type produced.
    type Config: Clone + Debug;

    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// Whether every candidate has been produced and fed back.
    fn is_done(&self) -> bool;

    /// Produce the next candidate.
    ///
    /// Errors with [`SearchError::GeneratorExhausted`] once done and with
    /// [`SearchError::UnexpectedFeedback`] if the previous candidate has not
    /// been fed back yet.
    fn next_config(&mut self) -> MsResult<Self::Config>;

    /// Feed back the measurement(s) of the last candidate. `None` entries
    /// mark failed profiling runs.
    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()>;
}

pub(crate) fn exhausted(generator: &str) -> MsError {
    SearchError::GeneratorExhausted {
        generator: generator.to_string(),
    }
    .into()
}

pub(crate) fn unexpected_feedback(generator: &str, message: &str) -> MsError {
    SearchError::UnexpectedFeedback {
        generator: generator.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// The measurement with the highest throughput; the first one wins ties.
pub fn best_by_throughput<M: Measurement>(measurements: Vec<Option<M>>) -> Option<M> {
    best_by(measurements, |a, b| {
        a.throughput()
            .partial_cmp(&b.throughput())
            .unwrap_or(Ordering::Equal)
    })
}

/// The highest-ranked measurement; the first one wins ties.
pub fn best_by_rank<M: Measurement>(measurements: Vec<Option<M>>) -> Option<M> {
    best_by(measurements, |a, b| a.rank_cmp(b))
}

fn best_by<M>(measurements: Vec<Option<M>>, cmp: impl Fn(&M, &M) -> Ordering) -> Option<M> {
    measurements.into_iter().flatten().fold(None, |best, m| match best {
        Some(b) if cmp(&m, &b) != Ordering::Greater => Some(b),
        _ => Some(m),
    })
}

/// Run the request/feedback loop until `generator` is exhausted.
///
/// Returns the number of candidates measured.
pub fn drive<M, G, F>(generator: &mut G, mut measure: F) -> MsResult<usize>
where
    M: Measurement,
    G: ConfigGenerator<M> + ?Sized,
    F: FnMut(&G::Config) -> Option<M>,
{
    let mut count = 0;
    while !generator.is_done() {
        let config = generator.next_config()?;
        let measurement = measure(&config);
        generator.set_last_results(vec![measurement])?;
        count += 1;
    }
    Ok(count)
}

/// Sequential concatenation of generators.
///
/// The front generator is drained completely, with feedback forwarded to
/// it, before the next one starts.
pub struct Chain<M, C> {
    generators: VecDeque<Box<dyn ConfigGenerator<M, Config = C>>>,
    awaiting_feedback: bool,
}

impl<M: Measurement, C: Clone + Debug> Chain<M, C> {
    pub fn new(generators: Vec<Box<dyn ConfigGenerator<M, Config = C>>>) -> Self {
        let mut chain = Self {
            generators: generators.into(),
            awaiting_feedback: false,
        };
        chain.drop_finished();
        chain
    }

    /// Generators not yet drained, the active one included.
    pub fn remaining(&self) -> usize {
        self.generators.len()
    }

    fn drop_finished(&mut self) {
        while self.generators.front().is_some_and(|g| g.is_done()) {
            self.generators.pop_front();
        }
    }
}

impl<M: Measurement, C: Clone + Debug> ConfigGenerator<M> for Chain<M, C> {
    type Config = C;

    fn name(&self) -> &str {
        "chain"
    }

    fn is_done(&self) -> bool {
        self.generators.iter().all(|g| g.is_done())
    }

    fn next_config(&mut self) -> MsResult<C> {
        if self.awaiting_feedback {
            return Err(unexpected_feedback(
                self.name(),
                "next configuration requested before results of the previous one",
            ));
        }
        self.drop_finished();
        let active = self
            .generators
            .front_mut()
            .ok_or_else(|| exhausted("chain"))?;
        let config = active.next_config()?;
        self.awaiting_feedback = true;
        Ok(config)
    }

    fn set_last_results(&mut self, measurements: Vec<Option<M>>) -> MsResult<()> {
        if !self.awaiting_feedback {
            return Err(unexpected_feedback(self.name(), "no configuration pending"));
        }
        let active = self
            .generators
            .front_mut()
            .ok_or_else(|| exhausted("chain"))?;
        active.set_last_results(measurements)?;
        self.awaiting_feedback = false;
        self.drop_finished();
        Ok(())
    }
}
