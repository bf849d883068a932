use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use repertoire::prelude::*;
use shakmaty::{Chess, Position};

use super::setup;

#[derive(Clone, Debug, Default)]
/// Counts oracle calls per position.
pub struct Calls(Arc<Mutex<HashMap<PositionKey, usize>>>);

impl Calls
{
    fn hit(&self, position: &Chess)
    {
        *self.0.lock().unwrap().entry(PositionKey::of(position)).or_default() += 1;
    }

    /// Calls at the position reached by a move text.
    pub fn at(&self, moves: &str) -> usize
    {
        self.0.lock().unwrap().get(&setup::key(moves)).copied().unwrap_or(0)
    }

    /// The most calls made at any single position.
    pub fn most(&self) -> usize
    {
        self.0.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> usize
    {
        self.0.lock().unwrap().values().sum()
    }
}

#[derive(Clone, Debug)]
enum Script
{
    Moves(Vec<Candidate>),
    Fail(Kind),
}

#[derive(Debug, Default)]
/// A popularity oracle that answers from a script; unscripted positions are unknown to it.
pub struct ScriptedPopularity
{
    script:    HashMap<PositionKey, Script>,
    pub calls: Calls,
}

impl ScriptedPopularity
{
    pub fn new() -> Self
    {
        ScriptedPopularity::default()
    }

    /// Scripts the candidates after a move text, as (uci, frequency) with a thousand games each.
    pub fn at(mut self, moves: &str, candidates: &[(&str, f64)]) -> Self
    {
        let candidates = candidates.iter().map(|(uci, frequency)| Candidate::new(uci, 1000, *frequency)).collect();
        self.script.insert(setup::key(moves), Script::Moves(candidates));
        self
    }

    /// Scripts candidates with explicit game counts.
    pub fn with_games(mut self, moves: &str, candidates: &[(&str, u64, f64)]) -> Self
    {
        let candidates = candidates.iter().map(|(uci, games, frequency)| Candidate::new(uci, *games, *frequency)).collect();
        self.script.insert(setup::key(moves), Script::Moves(candidates));
        self
    }

    pub fn failing_at(mut self, moves: &str, kind: Kind) -> Self
    {
        self.script.insert(setup::key(moves), Script::Fail(kind));
        self
    }
}

impl PopularityOracle for ScriptedPopularity
{
    fn popular_moves(&self, position: &Chess) -> Result<Vec<Candidate>>
    {
        self.calls.hit(position);
        match self.script.get(&PositionKey::of(position))
        {
            | Some(Script::Moves(candidates)) => Ok(candidates.clone()),
            | Some(Script::Fail(kind)) => Err(Error::new(*kind, "scripted failure".into())),
            | None => Ok(Vec::new()),
        }
    }
}

#[derive(Clone, Debug)]
enum Answer
{
    Move(String),
    Fail(Kind),
}

#[derive(Clone, Debug, Default)]
/// A response oracle that answers from a script shared by all its clones.
pub struct ScriptedResponder
{
    script:    Arc<HashMap<PositionKey, Answer>>,
    pub calls: Calls,
}

impl ScriptedResponder
{
    pub fn new() -> Self
    {
        ScriptedResponder::default()
    }

    /// Scripts the reply in the position after a move text.
    pub fn after(mut self, moves: &str, uci: &str) -> Self
    {
        Arc::make_mut(&mut self.script).insert(setup::key(moves), Answer::Move(uci.into()));
        self
    }

    pub fn failing_after(mut self, moves: &str, kind: Kind) -> Self
    {
        Arc::make_mut(&mut self.script).insert(setup::key(moves), Answer::Fail(kind));
        self
    }
}

impl ResponseOracle for ScriptedResponder
{
    fn best_reply(&mut self, position: &Chess, _budget: &SearchBudget) -> Result<EngineReply>
    {
        self.calls.hit(position);
        match self.script.get(&PositionKey::of(position))
        {
            | Some(Answer::Move(uci)) => Ok(EngineReply::new(uci, Some(Score::Centipawns(25)))),
            | Some(Answer::Fail(kind)) => Err(Error::new(*kind, "scripted failure".into())),
            | None => Err(Error::new(Kind::EngineUnavailable, "no scripted reply".into())),
        }
    }
}

/// The legal moves of a position in UCI, sorted.
fn sorted_moves(position: &Chess) -> Vec<String>
{
    let mut moves = position.legal_moves().iter().map(chess::uci_of).collect::<Vec<_>>();
    moves.sort();
    moves
}

#[derive(Debug, Default)]
/// A popularity oracle that knows every position: the first legal moves in UCI order, in decreasing popularity.
pub struct FirstMoves
{
    count:     usize,
    pub calls: Calls,
}

impl FirstMoves
{
    pub fn new(count: usize) -> Self
    {
        FirstMoves {
            count,
            calls: Calls::default(),
        }
    }
}

impl PopularityOracle for FirstMoves
{
    fn popular_moves(&self, position: &Chess) -> Result<Vec<Candidate>>
    {
        self.calls.hit(position);
        Ok(sorted_moves(position)
            .iter()
            .take(self.count)
            .enumerate()
            .map(|(i, uci)| {
                let games = 1000 / (i as u64 + 1);
                // A prime total, so that no share is exact in binary.
                Candidate::new(uci, games, games as f64 / 7919.0)
            })
            .collect())
    }
}

#[derive(Clone, Debug, Default)]
/// A response oracle that always plays the first legal move in UCI order.
pub struct FirstReply
{
    pub calls: Calls,
}

impl ResponseOracle for FirstReply
{
    fn best_reply(&mut self, position: &Chess, _budget: &SearchBudget) -> Result<EngineReply>
    {
        self.calls.hit(position);
        match sorted_moves(position).first()
        {
            | Some(uci) => Ok(EngineReply::new(uci, Some(Score::Centipawns(0)))),
            | None => Err(Error::new(Kind::InternalError, "no legal reply".into())),
        }
    }
}
