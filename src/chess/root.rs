use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, CastlingMode, Chess, Color, Position};

use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// The persisted description of where an analysis starts.
pub struct RootRecord
{
    /// A custom starting FEN, if the analysis does not begin from the standard position.
    pub fen:    Option<String>,
    /// The moves played from the starting position to reach the analysis root.
    pub prefix: Line,
    pub key:    PositionKey,
}

#[derive(Clone, Debug)]
/// The analysis root: a starting position plus the prefix line played from it.
pub struct Root
{
    fen:      Option<String>,
    start:    Chess,
    prefix:   Line,
    position: Chess,
    history:  Vec<PositionKey>,
    key:      PositionKey,
}

#[derive(Clone, Debug)]
/// A position reached by replaying a path from the root.
pub struct Replay
{
    pub position: Chess,
    /// Every key from the starting position (prefix included) up to and including this position.
    pub history:  Vec<PositionKey>,
}

impl Replay
{
    /// The key of the replayed position.
    pub fn key(&self) -> Option<&PositionKey>
    {
        self.history.last()
    }
}

impl Root
{
    /// Builds a root from an optional starting FEN and the move text played from it.
    pub fn new(fen: Option<&str>, moves: &str) -> Result<Root>
    {
        let start = match fen
        {
            | Some(text) =>
            {
                let parsed = text.parse::<Fen>().map_err(|_| Error::for_parse::<Fen>(text.into()))?;
                parsed
                    .into_position::<Chess>(CastlingMode::Standard)
                    .map_err(|e| Error::new(Kind::ConfigError, format!("{}: {}", text, e)))?
            }
            | None => Chess::default(),
        };

        let mut history = vec![PositionKey::of(&start)];
        let mut position = start.clone();
        let (prefix, _) = chess::parse_movetext(&start, moves)?;

        for ply in prefix.iter()
        {
            position = chess::play_uci(&position, &ply.uci)?.0;
            history.push(PositionKey::of(&position));
        }

        let key = PositionKey::of(&position);
        Ok(Root {
            fen: fen.map(str::to_owned),
            start,
            prefix,
            position,
            history,
            key,
        })
    }

    /// Rebuilds a root from its persisted record, checking that it still leads to the same key.
    pub fn from_record(record: &RootRecord) -> Result<Root>
    {
        let root = Root::new(record.fen.as_deref(), &record.prefix.uci())?;
        if root.key != record.key
        {
            return Err(Error::mismatch(&record.key, &root.key));
        }
        Ok(root)
    }

    pub fn fen(&self) -> Option<&str>
    {
        self.fen.as_deref()
    }

    pub fn key(&self) -> &PositionKey
    {
        &self.key
    }

    pub fn position(&self) -> &Chess
    {
        &self.position
    }

    pub fn prefix(&self) -> &Line
    {
        &self.prefix
    }

    /// The description of this root that is persisted alongside the progress.
    pub fn record(&self) -> RootRecord
    {
        RootRecord {
            fen:    self.fen.clone(),
            prefix: self.prefix.clone(),
            key:    self.key.clone(),
        }
    }

    /// Replays a path from the analysis root.
    pub fn replay(&self, path: &Line) -> Result<Replay>
    {
        let mut position = self.position.clone();
        let mut history = self.history.clone();

        for ply in path.iter()
        {
            position = chess::play_uci(&position, &ply.uci)?.0;
            history.push(PositionKey::of(&position));
        }

        Ok(Replay { position, history })
    }

    /// The side to move and the move number in the starting position, for numbering movetext.
    pub fn numbering(&self) -> (Color, u32)
    {
        (self.start.turn(), self.start.fullmoves().get())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn prefix_from_movetext()
    {
        let root = Root::new(None, "1. Nf3 d5 2. g3").unwrap();
        assert_eq!(root.prefix().len(), 3);
        assert_eq!(root.key().to_move(), Color::Black);
        assert_eq!(root.numbering(), (Color::White, 1));
    }

    #[test]
    fn replay_extends_history()
    {
        let root = Root::new(None, "").unwrap();
        let (path, _) = chess::parse_movetext(root.position(), "e4 e5").unwrap();
        let replay = root.replay(&path).unwrap();

        assert_eq!(replay.history.len(), 3);
        assert_eq!(replay.key(), Some(&PositionKey::of(&replay.position)));
    }

    #[test]
    fn custom_fen()
    {
        let fen = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";
        let root = Root::new(Some(fen), "Nf3").unwrap();
        assert_eq!(root.numbering(), (Color::White, 2));
        assert_eq!(root.prefix().uci(), "g1f3");
    }

    #[test]
    fn record_round_trip()
    {
        let root = Root::new(None, "1. d4 d5").unwrap();
        let rebuilt = Root::from_record(&root.record()).unwrap();
        assert_eq!(rebuilt.key(), root.key());

        let mut tampered = root.record();
        tampered.key = PositionKey::of(&Chess::default());
        assert_eq!(Root::from_record(&tampered).unwrap_err().kind, Kind::MismatchError);
    }
}
