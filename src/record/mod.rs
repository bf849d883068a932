use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Serialize;

use crate::prelude::*;

pub mod pgn;
pub mod report;

pub use report::{Summary, VariationReport};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
/// How a recorded path ends.
pub enum Leaf
{
    /// The last position was resolved without being expanded.
    Terminal(TerminalReason),
    /// The last position was reached first along another path, and its subtree is recorded there.
    Transposition(PositionKey),
    Failed(String),
    /// The run stopped before the last position was processed.
    Unexplored,
}

impl std::fmt::Display for Leaf
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            | Leaf::Terminal(reason) => write!(f, "{}", reason),
            | Leaf::Transposition(key) => write!(f, "transposes into {}", key),
            | Leaf::Failed(reason) => write!(f, "failed: {}", reason),
            | Leaf::Unexplored => write!(f, "unexplored"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// One root-to-leaf path through the explored tree.
pub struct CompletedPath
{
    /// The plies from the analysis root, prefix excluded.
    pub line:  Line,
    pub leaf:  Leaf,
    /// The engine's score for the last reply on the path.
    pub score: Option<Score>,
    /// The number of games in which the last candidate on the path was played.
    pub games: Option<u64>,
}

impl CompletedPath
{
    /// The number of candidate/reply pairs on the path.
    pub fn depth(&self) -> usize
    {
        self.line.len() / 2
    }
}

/// A pending step of the depth-first walk.
enum Step
{
    Visit
    {
        key:   PositionKey,
        line:  Line,
        score: Option<Score>,
        games: Option<u64>,
    },
    Emit(CompletedPath),
}

/// A read-only walk over every root-to-leaf path of an exploration, in expansion order.
///
/// An edge into a position belongs to the tree only if it is the first to reach that position breadth-first from
/// the root, which is exactly the edge the explorer expanded it through. Every other edge into the position is a
/// transposition, and ends its path there.
pub struct Paths<'a>
{
    entries: &'a BTreeMap<PositionKey, CacheEntry>,
    tree:    HashSet<(&'a PositionKey, usize)>,
    policy:  TranspositionPolicy,
    stack:   Vec<Step>,
}

impl<'a> Paths<'a>
{
    pub fn new(state: &'a ProgressState, policy: TranspositionPolicy) -> Paths<'a>
    {
        Paths {
            entries: &state.entries,
            tree: Paths::tree_edges(&state.entries, &state.root.key),
            policy,
            stack: vec![Step::Visit {
                key:   state.root.key.clone(),
                line:  Line::default(),
                score: None,
                games: None,
            }],
        }
    }

    /// The edges, as (parent, expansion index), through which each position was first reached.
    fn tree_edges(entries: &'a BTreeMap<PositionKey, CacheEntry>, root: &'a PositionKey) -> HashSet<(&'a PositionKey, usize)>
    {
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut edges = HashSet::new();

        while let Some(key) = queue.pop_front()
        {
            let Some(entry) = entries.get(key)
            else
            {
                continue;
            };

            for (index, child) in entry.expansions.iter().enumerate().filter_map(|(i, e)| e.child().map(|c| (i, c)))
            {
                if seen.insert(child)
                {
                    edges.insert((key, index));
                    queue.push_back(child);
                }
            }
        }

        edges
    }

    /// The number of edges that lead into an already reached position.
    pub fn transpositions(state: &ProgressState) -> usize
    {
        let tree = Paths::tree_edges(&state.entries, &state.root.key);
        let all = state.entries.values().map(|e| e.expansions.iter().filter(|x| x.child().is_some()).count()).sum::<usize>();
        all - tree.len()
    }
}

impl<'a> Iterator for Paths<'a>
{
    type Item = CompletedPath;

    fn next(&mut self) -> Option<CompletedPath>
    {
        while let Some(step) = self.stack.pop()
        {
            let entries = self.entries;
            let (key, line, score, games) = match step
            {
                | Step::Emit(path) => return Some(path),
                | Step::Visit { key, line, score, games } => (key, line, score, games),
            };

            let leaf = match entries.get_key_value(&key)
            {
                | None => Leaf::Unexplored,
                | Some((_, CacheEntry { status: EntryStatus::Terminal { reason }, .. })) => Leaf::Terminal(*reason),
                | Some((_, CacheEntry { status: EntryStatus::Failed { reason }, .. })) => Leaf::Failed(reason.clone()),
                | Some((parent, entry)) =>
                {
                    let mut steps = Vec::with_capacity(entry.expansions.len());

                    for (index, expansion) in entry.expansions.iter().enumerate()
                    {
                        let games = Some(expansion.candidate.games);
                        match &expansion.outcome
                        {
                            | ReplyOutcome::Reply { reply, child } =>
                            {
                                let Ok(line) = line.extended(expansion.ply.clone(), reply.ply.clone())
                                else
                                {
                                    continue;
                                };

                                if self.tree.contains(&(parent, index))
                                {
                                    steps.push(Step::Visit { key: child.clone(), line, score: reply.score, games });
                                }
                                else if self.policy == TranspositionPolicy::Record
                                {
                                    let leaf = Leaf::Transposition(child.clone());
                                    steps.push(Step::Emit(CompletedPath { line, leaf, score: reply.score, games }));
                                }
                            }
                            | ReplyOutcome::GameOver { reason } =>
                            {
                                let mut line = line.clone();
                                if line.push(expansion.ply.clone()).is_ok()
                                {
                                    let leaf = Leaf::Terminal(TerminalReason::GameOver(*reason));
                                    steps.push(Step::Emit(CompletedPath { line, leaf, score: None, games }));
                                }
                            }
                            | ReplyOutcome::NoResponse | ReplyOutcome::Failed { .. } =>
                            {}
                        }
                    }

                    self.stack.extend(steps.into_iter().rev());
                    continue;
                }
            };

            return Some(CompletedPath { line, leaf, score, games });
        }

        None
    }
}
