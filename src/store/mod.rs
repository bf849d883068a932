use std::{
    collections::{BTreeMap, VecDeque},
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
        MutexGuard,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::prelude::*;

mod entry;
mod journal;
mod state;

pub use entry::{CacheEntry, EntryStatus, Expansion, Reply, ReplyOutcome, TerminalReason};
use journal::Journal;
pub use state::{ProgressState, SCHEMA_VERSION};

#[derive(Clone, Debug, PartialEq)]
/// What a position's slot in the store holds.
enum Slot
{
    /// A worker has claimed the position and is expanding it; never persisted.
    Expanding,
    Resolved(CacheEntry),
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The result of trying to claim a position for expansion.
pub enum Claim
{
    /// The caller now owns the expansion of this position.
    Acquired,
    /// Someone got there first; the position must only be linked to.
    Taken(NodeStatus),
}

#[derive(Debug)]
/// The durable record of an exploration: every resolved position, and the frontier still to process.
///
/// Positions are claimed through a concurrent map, so checking for a transposition and marking a position as
/// being expanded happen in one step. Mutations that change what is persisted are serialized behind the journal's
/// lock. Every commit is appended to the journal as one record, and the journal is folded into an atomically
/// rewritten snapshot every so often.
pub struct ProgressStore
{
    path:     Option<PathBuf>,
    root:     RootRecord,
    settings: TraversalSettings,
    slots:    DashMap<PositionKey, Slot>,
    frontier: Mutex<VecDeque<ExplorationNode>>,
    journal:  Mutex<Journal>,
    flushes:  AtomicUsize,
}

impl ProgressStore
{
    /// A store that is never written anywhere.
    pub fn in_memory(root: RootRecord, settings: TraversalSettings) -> ProgressStore
    {
        ProgressStore::from_state(None, ProgressState::new(root, settings))
    }

    /// Opens the store at the given path, resuming from it when asked to and when it exists.
    ///
    /// A progress file that cannot be read, or that was made for a different root or under different traversal
    /// settings, refuses the resume.
    pub fn open(path: impl Into<PathBuf>, root: RootRecord, settings: TraversalSettings, resume: bool) -> Result<ProgressStore>
    {
        let path = path.into();

        if resume
        {
            if let Some(state) = ProgressStore::load(&path)?
            {
                if state.root != root
                {
                    let err = Error::mismatch(state.root.prefix.uci(), root.prefix.uci());
                    return Err(err.chain(Error::new(
                        Kind::MismatchError,
                        format!("{} belongs to a different analysis root", path.display()),
                    )));
                }

                if state.settings != settings
                {
                    let err = Error::mismatch(&state.settings, &settings);
                    return Err(err.chain(Error::new(
                        Kind::MismatchError,
                        format!("{} was explored under other settings; start over with --fresh", path.display()),
                    )));
                }

                log::info!(
                    "resuming from {}: {} positions resolved, {} pending",
                    path.display(),
                    state.entries.len(),
                    state.frontier.len()
                );

                // Folds the replayed journal into the snapshot, so that new records never follow a torn one.
                let store = ProgressStore::from_state(Some(path), state);
                store.flush()?;
                return Ok(store);
            }
        }
        else if path.exists()
        {
            log::warn!("starting fresh, {} will be overwritten", path.display());
        }

        let store = ProgressStore::from_state(Some(path), ProgressState::new(root, settings));
        store.flush()?;
        Ok(store)
    }

    /// Reads persisted progress, if there is any: the snapshot, with its journal replayed on top.
    pub fn load(path: &Path) -> Result<Option<ProgressState>>
    {
        let bytes = match std::fs::read(path)
        {
            | Ok(bytes) => bytes,
            | Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            | Err(e) => return Err(e.into()),
        };

        let refusal = || Error::corruption(format!("refusing to resume from {}", path.display()));
        let mut state = ProgressState::decode(&bytes).map_err(|e| e.chain(refusal()))?;
        let replayed = Journal::replay(&Journal::beside(path), &mut state).map_err(|e| e.chain(refusal()))?;
        if replayed > 0
        {
            log::debug!("replayed {} journal record(s) onto {}", replayed, path.display());
        }
        Ok(Some(state))
    }

    /// Writes a snapshot durably, replacing whatever was there before in one step.
    pub fn save(path: &Path, state: &ProgressState) -> Result<()>
    {
        let bytes = state.encode()?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let mut file = File::create(&staging)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    /// Builds a store around a state.
    fn from_state(path: Option<PathBuf>, state: ProgressState) -> ProgressStore
    {
        let slots = DashMap::with_capacity(state.entries.len());
        for (key, entry) in state.entries
        {
            slots.insert(key, Slot::Resolved(entry));
        }

        let journal = Journal::new(path.as_deref().map(Journal::beside), state.sequence);

        ProgressStore {
            path,
            root: state.root,
            settings: state.settings,
            slots,
            frontier: Mutex::new(state.frontier.into()),
            journal: Mutex::new(journal),
            flushes: AtomicUsize::new(0),
        }
    }
}

impl ProgressStore
{
    /// Removes a node from the frontier and appends its children, then persists.
    pub fn advance_frontier(&self, removed: &ExplorationNode, added: Vec<ExplorationNode>) -> Result<()>
    {
        let mut journal = self.write_lock();
        self.advance_locked(removed, added.clone())?;
        journal.append(None, Some((removed.clone(), added)))?;
        self.compact_if_due(&mut journal)
    }

    /// Claims a position for expansion unless it is already resolved or being expanded.
    pub fn claim(&self, key: &PositionKey) -> Claim
    {
        match self.slots.entry(key.clone())
        {
            | Entry::Occupied(slot) => Claim::Taken(match slot.get()
            {
                | Slot::Expanding => NodeStatus::Expanding,
                | Slot::Resolved(entry) => NodeStatus::from(&entry.status),
            }),
            | Entry::Vacant(slot) =>
            {
                slot.insert(Slot::Expanding);
                Claim::Acquired
            }
        }
    }

    /// Records a node's outcome and advances the frontier past it, persisting both together.
    ///
    /// This is the unit of resumability: until it returns, the node is still pending on disk.
    pub fn commit(&self, node: &ExplorationNode, entry: CacheEntry, children: Vec<ExplorationNode>) -> Result<()>
    {
        let mut journal = self.write_lock();
        if !self.frontier_lock().contains(node)
        {
            return Err(Error::new(Kind::InvalidState, format!("{} is not in the frontier", node)));
        }

        self.record_locked(&node.key, entry.clone())?;
        self.advance_locked(node, children.clone())?;
        journal.append(Some((node.key.clone(), entry)), Some((node.clone(), children)))?;
        self.compact_if_due(&mut journal)
    }

    /// The resolved entry for a position, if there is one.
    pub fn entry(&self, key: &PositionKey) -> Option<CacheEntry>
    {
        self.slots.get(key).and_then(|slot| match slot.value()
        {
            | Slot::Resolved(entry) => Some(entry.clone()),
            | Slot::Expanding => None,
        })
    }

    /// Writes a fresh snapshot holding everything journaled so far, if this store has a path.
    pub fn flush(&self) -> Result<()>
    {
        let mut journal = self.write_lock();
        self.flush_locked(&mut journal)
    }

    /// How many times a snapshot has been written out.
    pub fn flushes(&self) -> usize
    {
        self.flushes.load(Ordering::SeqCst)
    }

    /// The number of nodes waiting in the frontier.
    pub fn frontier_len(&self) -> usize
    {
        self.frontier_lock().len()
    }

    /// The number of resolved positions.
    pub fn len(&self) -> usize
    {
        self.slots.iter().filter(|slot| matches!(slot.value(), Slot::Resolved(_))).count()
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    /// Returns up to `n` nodes from the front of the frontier, without removing them.
    pub fn pending(&self, n: usize) -> Vec<ExplorationNode>
    {
        self.frontier_lock().iter().take(n).cloned().collect()
    }

    /// Records a position's outcome durably.
    ///
    /// Recording the same outcome twice is harmless; recording a different one for a resolved position is an error.
    /// The node stays in the frontier until it is advanced past, so prefer `commit`, which does both in one record.
    pub fn record_completion(&self, key: &PositionKey, entry: CacheEntry) -> Result<()>
    {
        let mut journal = self.write_lock();
        self.record_locked(key, entry.clone())?;
        journal.append(Some((key.clone(), entry)), None)?;
        self.compact_if_due(&mut journal)
    }

    /// Gives up a claim on a position that will not be expanded after all.
    pub fn release(&self, key: &PositionKey)
    {
        self.slots.remove_if(key, |_, slot| *slot == Slot::Expanding);
    }

    pub fn root(&self) -> &RootRecord
    {
        &self.root
    }

    /// The settings the progress was made under.
    pub fn settings(&self) -> &TraversalSettings
    {
        &self.settings
    }

    /// A consistent copy of everything that would be persisted.
    pub fn snapshot(&self) -> ProgressState
    {
        let journal = self.write_lock();
        self.snapshot_locked(&journal)
    }

    /// The lifecycle status of a position, if the store knows about it.
    pub fn status(&self, key: &PositionKey) -> Option<NodeStatus>
    {
        self.slots.get(key).map(|slot| match slot.value()
        {
            | Slot::Expanding => NodeStatus::Expanding,
            | Slot::Resolved(entry) => NodeStatus::from(&entry.status),
        })
    }
}

/// Lock-holding internals.
impl ProgressStore
{
    fn advance_locked(&self, removed: &ExplorationNode, added: Vec<ExplorationNode>) -> Result<()>
    {
        let mut frontier = self.frontier_lock();
        let Some(index) = frontier.iter().position(|node| node == removed)
        else
        {
            return Err(Error::new(Kind::InvalidState, format!("{} is not in the frontier", removed)));
        };

        frontier.remove(index);
        frontier.extend(added);
        Ok(())
    }

    fn compact_if_due(&self, journal: &mut Journal) -> Result<()>
    {
        match journal.is_due()
        {
            | true => self.flush_locked(journal),
            | false => Ok(()),
        }
    }

    fn flush_locked(&self, journal: &mut Journal) -> Result<()>
    {
        if let Some(path) = &self.path
        {
            ProgressStore::save(path, &self.snapshot_locked(journal))?;
            journal.reset()?;
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn frontier_lock(&self) -> MutexGuard<'_, VecDeque<ExplorationNode>>
    {
        self.frontier.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_locked(&self, key: &PositionKey, entry: CacheEntry) -> Result<()>
    {
        match self.slots.entry(key.clone())
        {
            | Entry::Occupied(mut slot) =>
            {
                let conflict = match slot.get()
                {
                    | Slot::Expanding => false,
                    | Slot::Resolved(existing) => *existing != entry,
                };

                if conflict
                {
                    return Err(Error::new(Kind::InvalidState, format!("{} was already resolved differently", key)));
                }
                slot.insert(Slot::Resolved(entry));
            }
            | Entry::Vacant(slot) =>
            {
                slot.insert(Slot::Resolved(entry));
            }
        }
        Ok(())
    }

    fn snapshot_locked(&self, journal: &Journal) -> ProgressState
    {
        let entries = self
            .slots
            .iter()
            .filter_map(|slot| match slot.value()
            {
                | Slot::Resolved(entry) => Some((slot.key().clone(), entry.clone())),
                | Slot::Expanding => None,
            })
            .collect::<BTreeMap<_, _>>();

        ProgressState {
            schema_version: SCHEMA_VERSION,
            root: self.root.clone(),
            settings: self.settings.clone(),
            sequence: journal.sequence(),
            entries,
            frontier: self.frontier_lock().iter().cloned().collect(),
        }
    }

    fn write_lock(&self) -> MutexGuard<'_, Journal>
    {
        self.journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
