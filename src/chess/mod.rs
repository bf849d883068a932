use shakmaty::{uci::UciMove, CastlingMode, Chess, Move, Position};

use crate::prelude::*;

pub(crate) mod key;
pub(crate) mod line;
pub(crate) mod notation;
pub(crate) mod root;
pub(crate) mod rules;

pub use key::PositionKey;
pub use line::{Line, Ply, MAXIMUM_PLY};
pub use notation::parse_movetext;
pub use root::{Replay, Root, RootRecord};
pub use rules::{game_over, GameOverReason};

/// Resolves a UCI string into a legal move in the given position.
pub fn resolve_uci(position: &Chess, uci: &str) -> Result<Move>
{
    let parsed = uci.parse::<UciMove>().map_err(|_| Error::for_parse::<UciMove>(uci.into()))?;
    parsed
        .to_move(position)
        .map_err(|e| Error::new(Kind::IllegalMove, format!("{} in {}: {}", uci, PositionKey::of(position), e)))
}

/// Plays a UCI move, returning the successor position and the ply that reached it.
pub fn play_uci(position: &Chess, uci: &str) -> Result<(Chess, Ply)>
{
    let mv = resolve_uci(position, uci)?;
    Ok(play_move(position, &mv))
}

/// Plays an already-legal move.
pub fn play_move(position: &Chess, mv: &Move) -> (Chess, Ply)
{
    let ply = Ply::new(position, mv);
    let mut next = position.clone();
    next.play_unchecked(mv);
    (next, ply)
}

/// The UCI spelling of a move, using standard castling notation.
pub fn uci_of(mv: &Move) -> String
{
    mv.to_uci(CastlingMode::Standard).to_string()
}
