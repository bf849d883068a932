use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// One position waiting in, or taken from, the frontier.
pub struct ExplorationNode
{
    pub key:   PositionKey,
    /// Full move pairs from the analysis root.
    pub depth: u32,
    /// The candidate/reply plies that lead here from the analysis root.
    pub path:  Line,
}

impl ExplorationNode
{
    /// The node for the analysis root.
    pub fn root(key: PositionKey) -> ExplorationNode
    {
        ExplorationNode {
            key,
            depth: 0,
            path: Line::default(),
        }
    }

    /// The node one candidate/reply pair further down.
    pub fn child(&self, key: PositionKey, candidate: Ply, reply: Ply) -> Result<ExplorationNode>
    {
        Ok(ExplorationNode {
            key,
            depth: self.depth + 1,
            path: self.path.extended(candidate, reply)?,
        })
    }
}

impl std::fmt::Display for ExplorationNode
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        if self.path.is_empty()
        {
            write!(f, "root [{}]", self.key)
        }
        else
        {
            write!(f, "{} [depth {}]", self.path.uci(), self.depth)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Where a node is in its lifecycle.
///
/// A node starts out `Pending` in the frontier. It either links to a position that is resolved or being resolved
/// elsewhere, or is claimed as `Expanding` and then ends `Completed`, `Terminal` or `Failed`.
pub enum NodeStatus
{
    Pending,
    Expanding,
    Completed,
    /// The node shares the entry already stored for this key instead of being expanded again.
    TranspositionLink(PositionKey),
    Terminal(TerminalReason),
    Failed(String),
}

impl NodeStatus
{
    /// Whether the node has reached the end of its lifecycle.
    pub fn is_final(&self) -> bool
    {
        !matches!(self, NodeStatus::Pending | NodeStatus::Expanding)
    }

    /// Moves on to the next status, refusing any transition the lifecycle does not have.
    pub fn advance(&mut self, next: NodeStatus) -> Result<()>
    {
        let allowed = match (&*self, &next)
        {
            | (NodeStatus::Pending, NodeStatus::Expanding | NodeStatus::TranspositionLink(_)) => true,
            | (NodeStatus::Expanding, NodeStatus::TranspositionLink(_)) => false,
            | (NodeStatus::Expanding, next) => next.is_final(),
            | _ => false,
        };

        if !allowed
        {
            return Err(Error::new(Kind::InvalidState, format!("a node that is {} cannot become {}", self, next)));
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for NodeStatus
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            | NodeStatus::Pending => write!(f, "pending"),
            | NodeStatus::Expanding => write!(f, "expanding"),
            | NodeStatus::Completed => write!(f, "completed"),
            | NodeStatus::TranspositionLink(key) => write!(f, "transposes into {}", key),
            | NodeStatus::Terminal(reason) => write!(f, "{}", reason),
            | NodeStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

impl From<&EntryStatus> for NodeStatus
{
    fn from(value: &EntryStatus) -> Self
    {
        match value
        {
            | EntryStatus::Completed => NodeStatus::Completed,
            | EntryStatus::Terminal { reason } => NodeStatus::Terminal(*reason),
            | EntryStatus::Failed { reason } => NodeStatus::Failed(reason.clone()),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn lifecycle()
    {
        let mut status = NodeStatus::Pending;
        status.advance(NodeStatus::Expanding).unwrap();
        assert!(!status.is_final());
        status.advance(NodeStatus::Terminal(TerminalReason::DepthLimit)).unwrap();
        assert!(status.is_final());

        let err = status.advance(NodeStatus::Completed).unwrap_err();
        assert_eq!(err.kind, Kind::InvalidState);
        assert_eq!(status, NodeStatus::Terminal(TerminalReason::DepthLimit));
    }

    #[test]
    fn links_skip_the_expansion()
    {
        let key = PositionKey::of(&shakmaty::Chess::default());

        let mut linked = NodeStatus::Pending;
        linked.advance(NodeStatus::TranspositionLink(key.clone())).unwrap();
        assert!(linked.is_final());
        assert_eq!(linked.to_string(), format!("transposes into {}", key));

        let mut claimed = NodeStatus::Pending;
        claimed.advance(NodeStatus::Expanding).unwrap();
        assert!(claimed.advance(NodeStatus::TranspositionLink(key)).is_err());
        assert!(NodeStatus::Pending.advance(NodeStatus::Completed).is_err());
    }
}
