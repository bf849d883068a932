use serde::{Deserialize, Serialize};
use shakmaty::Chess;

use crate::prelude::*;

pub mod budget;
pub mod lichess;
pub mod retry;
pub mod uci;

pub use budget::{parse_clock, SearchBudget};
pub use lichess::{ExplorerConfig, LichessExplorer};
pub use retry::RetryPolicy;
pub use uci::{EngineConfig, UciEngine};

/// A source of the moves humans most often play in a position.
///
/// Implementations are shared between workers, so they must be safe to call concurrently.
pub trait PopularityOracle: Sync
{
    /// Returns the candidates in this position, most frequently played first.
    ///
    /// An empty list means the position is unknown to the source.
    fn popular_moves(&self, position: &Chess) -> Result<Vec<Candidate>>;
}

/// A source of the best reply in a position.
///
/// Each worker owns its own instance, because an engine can only think about one position at a time.
pub trait ResponseOracle: Send
{
    /// Returns the best move for the side to move, within the given budget.
    fn best_reply(&mut self, position: &Chess, budget: &SearchBudget) -> Result<EngineReply>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// A move from the popularity source with its play statistics.
pub struct Candidate
{
    pub uci:       String,
    pub san:       String,
    /// The absolute number of games in which this move was played.
    pub games:     u64,
    /// The share of all games in this position that continued with this move, in `[0, 1]`.
    pub frequency: f64,
    pub white:     u64,
    pub draws:     u64,
    pub black:     u64,
}

impl Candidate
{
    /// A candidate without a result breakdown.
    pub fn new(uci: &str, games: u64, frequency: f64) -> Candidate
    {
        Candidate {
            uci: uci.into(),
            san: uci.into(),
            games,
            frequency,
            white: 0,
            draws: 0,
            black: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// An engine score from the perspective of the side that played the reply.
pub enum Score
{
    Centipawns(i32),
    Mate(i32),
}

impl Score
{
    /// Mates are scored as this many centipawns, minus the distance to mate.
    const MATE_SCORE: i32 = 10_000;

    /// The score in pawns, with mates mapped close to one hundred pawns.
    pub fn pawns(&self) -> f64
    {
        match *self
        {
            | Score::Centipawns(cp) => cp as f64 / 100.0,
            | Score::Mate(n) => (n.signum() * (Self::MATE_SCORE - n.abs())) as f64 / 100.0,
        }
    }
}

impl std::fmt::Display for Score
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            | Score::Centipawns(_) => write!(f, "{:+.2}", self.pawns()),
            | Score::Mate(n) => write!(f, "#{}", n),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The engine's choice in a position.
pub struct EngineReply
{
    pub uci:   String,
    pub score: Option<Score>,
}

impl EngineReply
{
    pub fn new(uci: &str, score: Option<Score>) -> EngineReply
    {
        EngineReply { uci: uci.into(), score }
    }
}
