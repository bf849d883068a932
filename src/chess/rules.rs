use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Position};

use crate::prelude::*;

/// Positions repeated this often along a line end the game.
const REPETITION_LIMIT: usize = 3;

/// Half-moves without a capture or pawn move after which the game is drawn.
const FIFTY_MOVE_PLIES: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Why a position ends the game.
pub enum GameOverReason
{
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoves,
    Repetition,
}

impl std::fmt::Display for GameOverReason
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let name = match self
        {
            | Self::Checkmate => "checkmate",
            | Self::Stalemate => "stalemate",
            | Self::InsufficientMaterial => "insufficient material",
            | Self::FiftyMoves => "fifty-move rule",
            | Self::Repetition => "threefold repetition",
        };
        write!(f, "{name}")
    }
}

/// Determines whether the game is over in this position.
///
/// The history is every key along the line that led here, including this position's own key, and is
/// only used to detect repetitions.
pub fn game_over(position: &Chess, history: &[PositionKey]) -> Option<GameOverReason>
{
    if position.is_checkmate()
    {
        Some(GameOverReason::Checkmate)
    }
    else if position.is_stalemate()
    {
        Some(GameOverReason::Stalemate)
    }
    else if position.is_insufficient_material()
    {
        Some(GameOverReason::InsufficientMaterial)
    }
    else if position.halfmoves() >= FIFTY_MOVE_PLIES
    {
        Some(GameOverReason::FiftyMoves)
    }
    else if repeated(history)
    {
        Some(GameOverReason::Repetition)
    }
    else
    {
        None
    }
}

/// Whether the last key in the history has already occurred often enough to be a repetition.
fn repeated(history: &[PositionKey]) -> bool
{
    match history.last()
    {
        | Some(current) => history.iter().filter(|k| *k == current).count() >= REPETITION_LIMIT,
        | None => false,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn replay(ucis: &[&str]) -> (Chess, Vec<PositionKey>)
    {
        let mut position = Chess::default();
        let mut history = vec![PositionKey::of(&position)];
        for uci in ucis
        {
            position = chess::play_uci(&position, uci).unwrap().0;
            history.push(PositionKey::of(&position));
        }
        (position, history)
    }

    #[test]
    fn ongoing()
    {
        let (position, history) = replay(&["e2e4", "e7e5"]);
        assert_eq!(game_over(&position, &history), None);
    }

    #[test]
    fn fools_mate()
    {
        let (position, history) = replay(&["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert_eq!(game_over(&position, &history), Some(GameOverReason::Checkmate));
    }

    #[test]
    fn knight_shuffle_repeats()
    {
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let (position, history) = replay(&[&shuffle[..], &shuffle[..]].concat());
        assert_eq!(game_over(&position, &history), Some(GameOverReason::Repetition));

        let (position, history) = replay(&shuffle);
        assert_eq!(game_over(&position, &history), None);
    }
}
