use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
/// Why a position was not expanded any further.
pub enum TerminalReason
{
    DepthLimit,
    GameOver(GameOverReason),
    NoPopularMoves,
    NoResponse,
}

impl std::fmt::Display for TerminalReason
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            | Self::DepthLimit => write!(f, "depth limit"),
            | Self::GameOver(reason) => write!(f, "game over ({})", reason),
            | Self::NoPopularMoves => write!(f, "no popular moves"),
            | Self::NoResponse => write!(f, "no engine response"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// The final state of an explored position.
pub enum EntryStatus
{
    Completed,
    Terminal
    {
        reason: TerminalReason,
    },
    Failed
    {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// The engine's reply to a candidate, as stored.
pub struct Reply
{
    pub ply:   Ply,
    pub score: Option<Score>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// What became of one candidate move.
pub enum ReplyOutcome
{
    /// The engine replied, leading to the child position.
    Reply
    {
        reply: Reply,
        child: PositionKey,
    },
    /// The candidate itself ended the game, so there is nothing to reply to.
    GameOver
    {
        reason: GameOverReason,
    },
    /// The engine did not answer within its budget.
    NoResponse,
    Failed
    {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// One candidate that survived the filters, and its outcome.
pub struct Expansion
{
    pub candidate: Candidate,
    pub ply:       Ply,
    pub outcome:   ReplyOutcome,
}

impl Expansion
{
    /// The child position, if the candidate led to one.
    pub fn child(&self) -> Option<&PositionKey>
    {
        match &self.outcome
        {
            | ReplyOutcome::Reply { child, .. } => Some(child),
            | _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// The persisted outcome of exploring one position.
pub struct CacheEntry
{
    pub status:     EntryStatus,
    /// The depth at which the position was first reached.
    pub depth:      u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expansions: Vec<Expansion>,
    /// Candidates dropped because the popularity source described them in a way we could not use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded:  Vec<String>,
}

impl CacheEntry
{
    /// An entry for a position that was expanded.
    pub fn expanded(status: EntryStatus, depth: u32, expansions: Vec<Expansion>, discarded: Vec<String>) -> CacheEntry
    {
        CacheEntry {
            status,
            depth,
            expansions,
            discarded,
        }
    }

    /// An entry for a position whose exploration failed outright.
    pub fn failed(depth: u32, reason: String, discarded: Vec<String>) -> CacheEntry
    {
        CacheEntry {
            status: EntryStatus::Failed { reason },
            depth,
            expansions: Vec::new(),
            discarded,
        }
    }

    /// An entry for a position that was not expanded.
    pub fn terminal(depth: u32, reason: TerminalReason) -> CacheEntry
    {
        CacheEntry {
            status: EntryStatus::Terminal { reason },
            depth,
            expansions: Vec::new(),
            discarded: Vec::new(),
        }
    }

    /// Whether this entry records a failure anywhere, for reporting.
    pub fn has_failures(&self) -> bool
    {
        matches!(self.status, EntryStatus::Failed { .. })
            || self.expansions.iter().any(|e| matches!(e.outcome, ReplyOutcome::Failed { .. }))
    }
}
