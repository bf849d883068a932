use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
/// Whether a path that transposes into an already explored position is emitted as its own record.
pub enum TranspositionPolicy
{
    /// Emit the path, ending with a note about the position it transposes into.
    #[default]
    Record,
    /// Leave the path out of the output entirely.
    Suppress,
}

#[derive(Clone, Debug, PartialEq)]
/// The options that shape an exploration.
pub struct ExploreOptions
{
    /// Nodes at this many move pairs from the root are never expanded.
    pub max_depth:      u32,

    /// Only this many of the most popular candidates are considered in any position.
    pub breadth:        usize,

    /// Candidates played in a smaller share of games than this are discarded.
    pub min_frequency:  f64,

    /// Candidates played in fewer games than this are discarded.
    pub min_games:      u64,

    /// The compute budget for every reply.
    pub budget:         SearchBudget,

    /// Whether to pick up a previous run's progress.
    pub resume:         bool,

    pub transpositions: TranspositionPolicy,

    /// How popularity lookups are retried.
    pub retry:          RetryPolicy,
}

impl Default for ExploreOptions
{
    fn default() -> Self
    {
        ExploreOptions {
            max_depth:      12,
            breadth:        5,
            min_frequency:  0.01,
            min_games:      500,
            budget:         SearchBudget::default(),
            resume:         true,
            transpositions: TranspositionPolicy::default(),
            retry:          RetryPolicy::default(),
        }
    }
}

impl ExploreOptions
{
    /// Checks the options for values that cannot describe a sensible exploration.
    pub fn validate(&self, prefix: &Line) -> Result<()>
    {
        if self.breadth == 0
        {
            return Err(Error::new(Kind::ConfigError, "The breadth must be at least 1.".into()));
        }

        if !(0.0 ..= 1.0).contains(&self.min_frequency)
        {
            return Err(Error::new(Kind::ConfigError, format!("The frequency floor {} is not within [0, 1].", self.min_frequency)));
        }

        let plies = prefix.len() + 2 * self.max_depth as usize;
        if plies > MAXIMUM_PLY
        {
            return Err(Error::new(
                Kind::ConfigError,
                format!("A depth of {} after a {}-ply prefix exceeds the {} ply limit.", self.max_depth, prefix.len(), MAXIMUM_PLY),
            ));
        }

        Ok(())
    }

    /// The part of these options that progress is only valid under.
    pub fn traversal(&self) -> TraversalSettings
    {
        TraversalSettings {
            max_depth:     self.max_depth,
            breadth:       self.breadth,
            min_frequency: self.min_frequency,
            min_games:     self.min_games,
            budget:        self.budget,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// The options that decide which positions are explored and what is recorded for them.
///
/// These are persisted with the progress, and a run can only continue progress made under the same settings.
pub struct TraversalSettings
{
    pub max_depth:     u32,
    pub breadth:       usize,
    pub min_frequency: f64,
    pub min_games:     u64,
    pub budget:        SearchBudget,
}

impl std::fmt::Display for TraversalSettings
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(
            f,
            "depth {}, breadth {}, frequency >= {}, games >= {}, {}",
            self.max_depth, self.breadth, self.min_frequency, self.min_games, self.budget
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Voluntary stopping points for a run, checked between nodes.
pub struct RunLimits
{
    /// Stop after this many frontier nodes have been processed.
    pub max_nodes:  Option<usize>,
    /// Stop once this much wall-clock time has passed.
    pub time_limit: Option<Duration>,
}

impl RunLimits
{
    /// Runs until the frontier is exhausted.
    pub fn none() -> Self
    {
        RunLimits::default()
    }

    pub fn nodes(n: usize) -> Self
    {
        RunLimits {
            max_nodes:  Some(n),
            time_limit: None,
        }
    }
}
