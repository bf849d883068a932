use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::prelude::*;

mod node;

pub use node::{ExplorationNode, NodeStatus};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Counters over the nodes processed by one run.
pub struct ExploreStats
{
    pub processed:      usize,
    pub expanded:       usize,
    pub transpositions: usize,
    pub terminal:       usize,
    pub failed:         usize,
}

impl std::fmt::Display for ExploreStats
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(
            f,
            "{} processed ({} expanded, {} transpositions, {} terminal, {} failed)",
            self.processed, self.expanded, self.transpositions, self.terminal, self.failed
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Why a run came to an end.
pub enum RunOutcome
{
    /// The frontier is empty; the tree is complete.
    Exhausted,
    Cancelled,
    NodeLimit,
    TimeLimit,
}

impl RunOutcome
{
    pub fn is_complete(&self) -> bool
    {
        *self == RunOutcome::Exhausted
    }
}

impl std::fmt::Display for RunOutcome
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            | RunOutcome::Exhausted => write!(f, "exhausted the frontier"),
            | RunOutcome::Cancelled => write!(f, "cancelled"),
            | RunOutcome::NodeLimit => write!(f, "reached the node limit"),
            | RunOutcome::TimeLimit => write!(f, "reached the time limit"),
        }
    }
}

/// What the claiming pass decided for a node.
enum Plan
{
    /// The position is resolved or being resolved elsewhere.
    Link,
    /// The position ends here without consulting the oracles.
    Resolve(CacheEntry),
    Expand(Replay),
}

/// The outcome of expanding one node: its entry and the children it enqueues.
type Expanded = (CacheEntry, Vec<ExplorationNode>);

/// Explores the opening tree breadth-first from the analysis root.
///
/// Nodes are taken from the front of the store's frontier in batches of at most one per response oracle. Within a
/// batch, nodes are claimed in frontier order, expanded in parallel, and committed in frontier order again, so the
/// result does not depend on the number of workers.
pub struct TreeExplorer<'a, P, R>
where
    P: PopularityOracle,
    R: ResponseOracle,
{
    options:    ExploreOptions,
    root:       Root,
    store:      &'a ProgressStore,
    popularity: &'a P,
    responders: Vec<R>,
    cancel:     Arc<AtomicBool>,
    stats:      ExploreStats,
}

impl<'a, P, R> TreeExplorer<'a, P, R>
where
    P: PopularityOracle,
    R: ResponseOracle,
{
    /// Creates an explorer, with one worker per response oracle.
    pub fn new(options: ExploreOptions, root: Root, store: &'a ProgressStore, popularity: &'a P, responders: Vec<R>) -> Result<Self>
    {
        options.validate(root.prefix())?;

        if responders.is_empty()
        {
            return Err(Error::new(Kind::ConfigError, "At least one response oracle is required.".into()));
        }

        if store.root().key != *root.key()
        {
            return Err(Error::mismatch(&store.root().key, root.key()));
        }

        if *store.settings() != options.traversal()
        {
            return Err(Error::mismatch(store.settings(), &options.traversal()));
        }

        Ok(TreeExplorer {
            options,
            root,
            store,
            popularity,
            responders,
            cancel: Arc::new(AtomicBool::new(false)),
            stats: ExploreStats::default(),
        })
    }

    /// A flag that stops the run at the next batch boundary once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool>
    {
        self.cancel.clone()
    }

    pub fn stats(&self) -> ExploreStats
    {
        self.stats
    }

    /// Processes the frontier until it is exhausted, a limit is reached, or the run is cancelled.
    pub fn run(&mut self, limits: RunLimits) -> Result<RunOutcome>
    {
        let started = Instant::now();
        let processed_before = self.stats.processed;

        log::info!(
            "exploring from {} with {} worker(s): {} positions resolved, {} pending",
            self.root.key(),
            self.responders.len(),
            self.store.len(),
            self.store.frontier_len()
        );

        loop
        {
            if self.cancel.load(Ordering::SeqCst)
            {
                return self.finish(RunOutcome::Cancelled);
            }

            let processed = self.stats.processed - processed_before;
            if limits.max_nodes.is_some_and(|n| processed >= n)
            {
                return self.finish(RunOutcome::NodeLimit);
            }

            if limits.time_limit.is_some_and(|t| started.elapsed() >= t)
            {
                return self.finish(RunOutcome::TimeLimit);
            }

            let allowance = limits.max_nodes.map_or(usize::MAX, |n| n - processed);
            let batch = self.store.pending(self.responders.len().min(allowance));
            if batch.is_empty()
            {
                return self.finish(RunOutcome::Exhausted);
            }

            self.process(batch)?;
        }
    }

    /// Logs and returns the outcome of a run.
    fn finish(&self, outcome: RunOutcome) -> Result<RunOutcome>
    {
        log::info!("{}: {}; {} still pending", outcome, self.stats, self.store.frontier_len());
        Ok(outcome)
    }

    /// Claims, expands and commits one batch of frontier nodes.
    fn process(&mut self, batch: Vec<ExplorationNode>) -> Result<()>
    {
        let mut statuses = vec![NodeStatus::Pending; batch.len()];
        let mut plans = Vec::with_capacity(batch.len());

        for (node, status) in batch.iter().zip(statuses.iter_mut())
        {
            match self.plan(node, status)
            {
                | Ok(plan) => plans.push(plan),
                | Err(err) =>
                {
                    if *status == NodeStatus::Expanding
                    {
                        self.store.release(&node.key);
                    }
                    self.release(&batch, &plans, 0);
                    return Err(err);
                }
            }
        }

        let mut expanded = self.expand_all(&batch, &plans);

        for (index, (node, plan)) in batch.iter().zip(plans.iter()).enumerate()
        {
            let status = &mut statuses[index];
            let result = match plan
            {
                | Plan::Link => self.store.advance_frontier(node, Vec::new()).map(|_| 0),
                | Plan::Resolve(entry) => self
                    .store
                    .commit(node, entry.clone(), Vec::new())
                    .and_then(|_| status.advance(NodeStatus::from(&entry.status)))
                    .map(|_| 0),
                | Plan::Expand(_) => match expanded[index].take()
                {
                    | Some(Ok((entry, children))) =>
                    {
                        let next = NodeStatus::from(&entry.status);
                        let count = children.len();
                        self.store.commit(node, entry, children).and_then(|_| status.advance(next)).map(|_| count)
                    }
                    | Some(Err(err)) => Err(err),
                    | None => Err(Error::new(Kind::InternalError, format!("{} was never expanded", node))),
                },
            };

            match result
            {
                | Ok(children) => self.tally(node, &statuses[index], children),
                | Err(err) =>
                {
                    self.release(&batch, &plans, index);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Decides what to do with a pending node, claiming its position if it is to be expanded.
    fn plan(&self, node: &ExplorationNode, status: &mut NodeStatus) -> Result<Plan>
    {
        if let Claim::Taken(existing) = self.store.claim(&node.key)
        {
            log::trace!("{} reaches a position that is already {}", node, existing);
            status.advance(NodeStatus::TranspositionLink(node.key.clone()))?;
            return Ok(Plan::Link);
        }
        status.advance(NodeStatus::Expanding)?;

        if node.depth >= self.options.max_depth
        {
            return Ok(Plan::Resolve(CacheEntry::terminal(node.depth, TerminalReason::DepthLimit)));
        }

        let replay = self.root.replay(&node.path)?;
        if replay.key() != Some(&node.key)
        {
            let actual = replay.key().map(PositionKey::to_string).unwrap_or_default();
            return Err(Error::mismatch(node.key.to_string(), actual).chain(Error::corruption(format!("{} does not lead to its position", node))));
        }

        if let Some(reason) = game_over(&replay.position, &replay.history)
        {
            return Ok(Plan::Resolve(CacheEntry::terminal(node.depth, TerminalReason::GameOver(reason))));
        }

        Ok(Plan::Expand(replay))
    }

    /// Runs the expansions of a batch, one per worker, in parallel when there is more than one.
    fn expand_all(&mut self, batch: &[ExplorationNode], plans: &[Plan]) -> Vec<Option<Result<Expanded>>>
    {
        let TreeExplorer {
            options,
            popularity,
            responders,
            ..
        } = self;
        let options = &*options;
        let popularity = *popularity;

        let jobs = batch
            .iter()
            .zip(plans.iter())
            .enumerate()
            .filter_map(|(index, (node, plan))| match plan
            {
                | Plan::Expand(replay) => Some((index, node, replay)),
                | _ => None,
            })
            .collect::<Vec<_>>();

        let mut results = batch.iter().map(|_| None).collect::<Vec<_>>();

        if let [(index, node, replay)] = jobs.as_slice()
        {
            results[*index] = Some(expand(options, popularity, &mut responders[0], node, replay));
            return results;
        }

        let finished = std::thread::scope(|scope| {
            let handles = responders
                .iter_mut()
                .zip(jobs)
                .map(|(responder, (index, node, replay))| {
                    (index, scope.spawn(move || expand(options, popularity, responder, node, replay)))
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|(index, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(Error::new(Kind::InternalError, format!("the worker expanding {} panicked", batch[index]))));
                    (index, result)
                })
                .collect::<Vec<_>>()
        });

        for (index, result) in finished
        {
            results[index] = Some(result);
        }
        results
    }

    /// Logs and counts a node that reached the end of its lifecycle.
    fn tally(&mut self, node: &ExplorationNode, status: &NodeStatus, children: usize)
    {
        self.stats.processed += 1;
        match status
        {
            | NodeStatus::TranspositionLink(_) =>
            {
                log::debug!("{} {}", node, status);
                self.stats.transpositions += 1;
            }
            | NodeStatus::Completed =>
            {
                log::info!("expanded {} into {} line(s)", node, children);
                self.stats.expanded += 1;
            }
            | NodeStatus::Terminal(_) =>
            {
                log::debug!("{} is terminal: {}", node, status);
                self.stats.terminal += 1;
            }
            | NodeStatus::Failed(_) =>
            {
                log::warn!("could not expand {}, {}", node, status);
                self.stats.failed += 1;
            }
            | NodeStatus::Pending | NodeStatus::Expanding => log::error!("{} was committed while still {}", node, status),
        }
    }

    /// Gives back the claims of every node in the batch from `from` onwards that never got committed.
    fn release(&self, batch: &[ExplorationNode], plans: &[Plan], from: usize)
    {
        for (node, plan) in batch.iter().zip(plans.iter()).skip(from)
        {
            if !matches!(plan, Plan::Link)
            {
                self.store.release(&node.key);
            }
        }
    }
}

/// Expands one claimed node: asks for the popular candidates, filters them, and asks for a reply to each survivor.
///
/// Failures confined to the node are recorded in its entry; only run-fatal errors are returned.
fn expand<P, R>(options: &ExploreOptions, popularity: &P, responder: &mut R, node: &ExplorationNode, replay: &Replay) -> Result<Expanded>
where
    P: PopularityOracle,
    R: ResponseOracle,
{
    let position = &replay.position;

    let raw = match options.retry.run(&format!("popular moves at {}", node), || popularity.popular_moves(position))
    {
        | Ok(raw) => raw,
        | Err(err) if err.fatal() => return Err(err),
        | Err(err) => return Ok((CacheEntry::failed(node.depth, err.to_string(), Vec::new()), Vec::new())),
    };

    let mut discarded = Vec::new();
    let legal = raw
        .into_iter()
        .filter_map(|candidate| match chess::resolve_uci(position, &candidate.uci)
        {
            | Ok(mv) => Some((candidate, mv)),
            | Err(err) =>
            {
                log::warn!("discarding candidate {} at {}: {}", candidate.uci, node, err.msg);
                discarded.push(format!("{}: {}", candidate.uci, err.msg));
                None
            }
        })
        .collect::<Vec<_>>();

    let survivors = legal
        .into_iter()
        .take(options.breadth)
        .filter(|(candidate, _)| candidate.frequency >= options.min_frequency && candidate.games >= options.min_games)
        .collect::<Vec<_>>();

    if survivors.is_empty()
    {
        let status = EntryStatus::Terminal {
            reason: TerminalReason::NoPopularMoves,
        };
        return Ok((CacheEntry::expanded(status, node.depth, Vec::new(), discarded), Vec::new()));
    }

    let mut expansions = Vec::with_capacity(survivors.len());
    let mut children = Vec::new();

    for (candidate, mv) in survivors
    {
        let (successor, ply) = chess::play_move(position, &mv);
        let mut history = replay.history.clone();
        history.push(PositionKey::of(&successor));

        let outcome = match game_over(&successor, &history)
        {
            | Some(reason) => ReplyOutcome::GameOver { reason },
            | None => match responder.best_reply(&successor, &options.budget)
            {
                | Ok(reply) => match chess::resolve_uci(&successor, &reply.uci)
                {
                    | Ok(answer) =>
                    {
                        let (grandchild, reply_ply) = chess::play_move(&successor, &answer);
                        let child = PositionKey::of(&grandchild);
                        children.push(node.child(child.clone(), ply.clone(), reply_ply.clone())?);
                        ReplyOutcome::Reply {
                            reply: Reply {
                                ply:   reply_ply,
                                score: reply.score,
                            },
                            child,
                        }
                    }
                    | Err(err) => ReplyOutcome::Failed { reason: err.to_string() },
                },
                | Err(err) if err.kind == Kind::EngineTimeout =>
                {
                    log::warn!("no reply to {} at {}: {}", ply, node, err);
                    ReplyOutcome::NoResponse
                }
                | Err(err) =>
                {
                    log::warn!("reply to {} at {} failed: {}", ply, node, err);
                    ReplyOutcome::Failed { reason: err.to_string() }
                }
            },
        };

        expansions.push(Expansion { candidate, ply, outcome });
    }

    let progressed = expansions
        .iter()
        .any(|e| matches!(e.outcome, ReplyOutcome::Reply { .. } | ReplyOutcome::GameOver { .. }));

    let status = if progressed
    {
        EntryStatus::Completed
    }
    else if let Some(reason) = expansions.iter().find_map(|e| match &e.outcome
    {
        | ReplyOutcome::Failed { reason } => Some(reason.clone()),
        | _ => None,
    })
    {
        EntryStatus::Failed { reason }
    }
    else
    {
        EntryStatus::Terminal {
            reason: TerminalReason::NoResponse,
        }
    };

    Ok((CacheEntry::expanded(status, node.depth, expansions, discarded), children))
}
