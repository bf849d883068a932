use lazy_static::lazy_static;
use regex::Regex;
use shakmaty::{san::San, Chess, Move};

use crate::prelude::*;

lazy_static! {
    /// Move numbers (`12.`, `12...`), results and comments carry no move information.
    static ref NOISE: Regex = Regex::new(r"(\{[^}]*\})|(\b[0-9]+\.(\.\.)?)|(1-0|0-1|1/2-1/2|\*)").unwrap();
}

/// Parses a move text such as `1. Nf3 d5 2. g3` into a line from the given position.
///
/// Tokens are read as SAN first and fall back to UCI, so `e2e4 e7e5` is also accepted.
pub fn parse_movetext(start: &Chess, text: &str) -> Result<(Line, Chess)>
{
    let cleaned = NOISE.replace_all(text, " ");

    let mut line = Line::default();
    let mut position = start.clone();

    for token in cleaned.split_whitespace()
    {
        let mv = parse_token(&position, token).map_err(|e| e.chain_parse::<Line>(text.into()))?;
        let (next, ply) = chess::play_move(&position, &mv);
        line.push(ply)?;
        position = next;
    }

    Ok((line, position))
}

/// Reads a single move token in either notation.
fn parse_token(position: &Chess, token: &str) -> Result<Move>
{
    if let Ok(san) = token.parse::<San>()
    {
        if let Ok(mv) = san.to_move(position)
        {
            return Ok(mv);
        }
    }

    chess::resolve_uci(position, token)
        .map_err(|e| e.chain(Error::new(Kind::IllegalMove, format!("'{}' is not playable here.", token))))
}
