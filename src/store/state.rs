use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::journal::Record;
use crate::prelude::*;

/// The layout version of persisted progress; bumped whenever the layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// The whole persisted exploration.
///
/// Entries are kept ordered by key so that equal states always serialize to equal bytes.
pub struct ProgressState
{
    pub schema_version: u32,
    pub root:           RootRecord,
    pub settings:       TraversalSettings,
    /// The last journal record folded into this state.
    pub sequence:       u64,
    pub entries:        BTreeMap<PositionKey, CacheEntry>,
    pub frontier:       Vec<ExplorationNode>,
}

#[derive(Deserialize)]
/// Just enough of a progress file to tell which layout it uses.
struct Versioned
{
    schema_version: Option<u32>,
}

impl ProgressState
{
    /// A fresh exploration with only the root waiting in the frontier.
    pub fn new(root: RootRecord, settings: TraversalSettings) -> ProgressState
    {
        let frontier = vec![ExplorationNode::root(root.key.clone())];
        ProgressState {
            schema_version: SCHEMA_VERSION,
            root,
            settings,
            sequence: 0,
            entries: BTreeMap::new(),
            frontier,
        }
    }

    /// Decodes a persisted state, refusing anything from an incompatible layout.
    pub fn decode(bytes: &[u8]) -> Result<ProgressState>
    {
        let versioned: Versioned =
            serde_json::from_slice(bytes).map_err(|e| Error::corruption(format!("progress is not readable: {}", e)))?;

        match versioned.schema_version
        {
            | Some(SCHEMA_VERSION) =>
            {}
            | Some(other) =>
            {
                return Err(Error::corruption(format!(
                    "progress uses schema version {}, but this build understands version {}",
                    other, SCHEMA_VERSION
                )))
            }
            | None => return Err(Error::corruption("progress has no schema version".into())),
        }

        let state: ProgressState =
            serde_json::from_slice(bytes).map_err(|e| Error::corruption(format!("progress does not match schema version {}: {}", SCHEMA_VERSION, e)))?;
        state.check()?;
        Ok(state)
    }

    /// Encodes the state for durable storage.
    pub fn encode(&self) -> Result<Vec<u8>>
    {
        serde_json::to_vec_pretty(self).map_err(|e| Error::new(Kind::InternalError, format!("could not encode progress: {}", e)))
    }

    /// Applies the next journal record.
    pub(crate) fn apply(&mut self, record: Record) -> Result<()>
    {
        if record.seq != self.sequence + 1
        {
            return Err(Error::corruption(format!("journal record {} does not follow record {}", record.seq, self.sequence)));
        }

        if let Some((key, entry)) = record.resolved
        {
            if self.entries.get(&key).is_some_and(|existing| *existing != entry)
            {
                return Err(Error::corruption(format!("journal record {} resolves {} differently", record.seq, key)));
            }
            self.entries.insert(key, entry);
        }

        if let Some((removed, added)) = record.advanced
        {
            let Some(index) = self.frontier.iter().position(|node| *node == removed)
            else
            {
                return Err(Error::corruption(format!("journal record {} advances past {}, which is not pending", record.seq, removed)));
            };
            self.frontier.remove(index);
            self.frontier.extend(added);
        }

        self.sequence = record.seq;
        Ok(())
    }

    /// Checks the internal consistency of a decoded state.
    fn check(&self) -> Result<()>
    {
        for node in self.frontier.iter()
        {
            if node.path.len() != 2 * node.depth as usize
            {
                return Err(Error::corruption(format!("frontier node {} has a path that does not match its depth", node)));
            }
        }

        if self.frontier.is_empty() && !self.entries.contains_key(&self.root.key)
        {
            return Err(Error::corruption("the frontier is empty but the root was never explored".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn state() -> ProgressState
    {
        let root = Root::new(None, "1. e4").unwrap();
        let mut state = ProgressState::new(root.record(), ExploreOptions::default().traversal());
        state.entries.insert(root.key().clone(), CacheEntry::terminal(0, TerminalReason::NoPopularMoves));
        state
    }

    #[test]
    fn byte_stable()
    {
        let state = state();
        let bytes = state.encode().unwrap();
        let decoded = ProgressState::decode(&bytes).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn frequencies_survive_exactly()
    {
        let mut state = state();
        let root = Root::new(None, "1. e4").unwrap();
        let expansions = (1 .. 2000)
            .map(|games| {
                let (_, ply) = chess::play_uci(root.position(), "e7e5").unwrap();
                Expansion {
                    candidate: Candidate::new("e7e5", games, games as f64 / 7919.0),
                    ply,
                    outcome: ReplyOutcome::NoResponse,
                }
            })
            .collect::<Vec<_>>();
        let entry = CacheEntry::expanded(EntryStatus::Terminal { reason: TerminalReason::NoResponse }, 0, expansions, vec![]);
        state.entries.insert(root.key().clone(), entry);

        let bytes = state.encode().unwrap();
        let decoded = ProgressState::decode(&bytes).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn rejects_other_schema_versions()
    {
        let mut state = state();
        state.schema_version = SCHEMA_VERSION + 1;
        let bytes = state.encode().unwrap();

        let err = ProgressState::decode(&bytes).unwrap_err();
        assert_eq!(err.kind, Kind::ProgressStoreCorruption);
        assert!(err.msg.contains("schema version"));
    }

    #[test]
    fn rejects_garbage()
    {
        for bytes in [&b"not json"[..], &b"{}"[..], &b"{\"schema_version\": 2}"[..]]
        {
            let err = ProgressState::decode(bytes).unwrap_err();
            assert_eq!(err.kind, Kind::ProgressStoreCorruption);
        }
    }
}
