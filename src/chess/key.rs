use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, CastlingMode, Chess, Color, EnPassantMode};

use crate::prelude::*;

/// The number of FEN fields that identify a position: placement, side to move, castling rights and en passant target.
const IDENTITY_FIELDS: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// The canonical identity of a position, independent of the move order that reached it.
///
/// This is the first four fields of the FEN. The en passant target is only included when a capture is
/// actually legal, so that two positions which differ only by an unusable target share a key. The move
/// clocks are deliberately absent.
pub struct PositionKey(String);

impl PositionKey
{
    /// Computes the key of a position.
    pub fn of(position: &Chess) -> PositionKey
    {
        let fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
        let fields = fen.split_whitespace().take(IDENTITY_FIELDS).collect::<Vec<_>>();
        PositionKey(fields.join(" "))
    }

    /// The canonical text of the key.
    pub fn as_str(&self) -> &str
    {
        &self.0
    }

    /// Rebuilds a position from the key, with zeroed move clocks.
    pub fn position(&self) -> Result<Chess>
    {
        let fen = format!("{} 0 1", self.0);
        let parsed = fen.parse::<Fen>().map_err(|_| Error::for_parse::<PositionKey>(self.0.clone()))?;
        parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| Error::new(Kind::ParseError, format!("{}: {}", self.0, e)))
    }

    /// Determines which player needs to move.
    pub fn to_move(&self) -> Color
    {
        match self.0.split_whitespace().nth(1)
        {
            | Some("b") => Color::Black,
            | _ => Color::White,
        }
    }
}

impl std::fmt::Display for PositionKey
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PositionKey
{
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
    {
        let fields = s.split_whitespace().collect::<Vec<_>>();
        if fields.len() != IDENTITY_FIELDS
        {
            return Err(Error::for_parse::<Self>(s.into()));
        }

        // Round-trip through a real position so that stored keys are always canonical.
        let candidate = PositionKey(fields.join(" "));
        let position = candidate.position()?;
        let canonical = PositionKey::of(&position);

        if canonical != candidate
        {
            return Err(Error::mismatch(canonical, candidate).chain_parse::<Self>(s.into()));
        }
        Ok(canonical)
    }
}

impl TryFrom<String> for PositionKey
{
    type Error = Error;
    fn try_from(value: String) -> std::result::Result<Self, Self::Error>
    {
        value.parse()
    }
}

impl From<PositionKey> for String
{
    fn from(value: PositionKey) -> Self
    {
        value.0
    }
}
