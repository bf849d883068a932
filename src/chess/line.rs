use arrayvec::ArrayVec;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use shakmaty::{san::San, Chess, Color, Move};

use crate::prelude::*;

/// The longest line we will ever store, prefix included; 128 full moves.
pub const MAXIMUM_PLY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// One half-move, kept in both machine and human notation.
pub struct Ply
{
    pub uci: String,
    pub san: String,
}

impl Ply
{
    /// Describes a legal move in the position it is played from.
    pub fn new(position: &Chess, mv: &Move) -> Ply
    {
        Ply {
            uci: chess::uci_of(mv),
            san: San::from_move(position, mv).to_string(),
        }
    }
}

impl std::fmt::Display for Ply
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{}", self.san)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// A sequence of plies from some starting position.
pub struct Line
{
    plies: ArrayVec<Ply, MAXIMUM_PLY>,
}

impl Line
{
    /// Returns a copy of this line extended by a candidate and its reply.
    pub fn extended(&self, candidate: Ply, reply: Ply) -> Result<Line>
    {
        let mut next = self.clone();
        next.push(candidate)?;
        next.push(reply)?;
        Ok(next)
    }

    pub fn is_empty(&self) -> bool
    {
        self.plies.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ply>
    {
        self.plies.iter()
    }

    pub fn last(&self) -> Option<&Ply>
    {
        self.plies.last()
    }

    pub fn len(&self) -> usize
    {
        self.plies.len()
    }

    /// Renders the line as numbered movetext, e.g. `1. e4 e5 2. Nf3` or `3... Nc6 4. Bb5`.
    pub fn movetext(&self, turn: Color, fullmoves: u32) -> String
    {
        let mut number = fullmoves;
        let mut turn = turn;
        let mut tokens = Vec::with_capacity(self.len() + self.len() / 2 + 1);

        for (i, ply) in self.plies.iter().enumerate()
        {
            match turn
            {
                | Color::White => tokens.push(format!("{}. {}", number, ply.san)),
                | Color::Black if i == 0 => tokens.push(format!("{}... {}", number, ply.san)),
                | Color::Black => tokens.push(ply.san.clone()),
            }

            if turn == Color::Black
            {
                number += 1;
            }
            turn = turn.other();
        }

        tokens.into_iter().join(" ")
    }

    /// Appends a ply, failing if the line is already at its maximum length.
    pub fn push(&mut self, ply: Ply) -> Result<()>
    {
        self.plies
            .try_push(ply)
            .map_err(|_| Error::new(Kind::InvalidState, format!("Lines are limited to {} plies.", MAXIMUM_PLY)))
    }

    /// Concatenates two lines.
    pub fn then(&self, rest: &Line) -> Result<Line>
    {
        let mut next = self.clone();
        for ply in rest.iter()
        {
            next.push(ply.clone())?;
        }
        Ok(next)
    }

    /// The UCI spelling of every ply, space separated.
    pub fn uci(&self) -> String
    {
        self.plies.iter().map(|p| p.uci.as_str()).join(" ")
    }
}

impl std::fmt::Display for Line
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "{}", self.movetext(Color::White, 1))
    }
}

impl<'a> IntoIterator for &'a Line
{
    type Item = &'a Ply;
    type IntoIter = std::slice::Iter<'a, Ply>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.iter()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn line(ucis: &[&str]) -> (Line, Chess)
    {
        let mut position = Chess::default();
        let mut line = Line::default();
        for uci in ucis
        {
            let (next, ply) = chess::play_uci(&position, uci).unwrap();
            line.push(ply).unwrap();
            position = next;
        }
        (line, position)
    }

    #[test]
    fn numbered_from_white()
    {
        let (line, _) = line(&["e2e4", "e7e5", "g1f3"]);
        assert_eq!(line.movetext(Color::White, 1), "1. e4 e5 2. Nf3");
        assert_eq!(line.uci(), "e2e4 e7e5 g1f3");
    }

    #[test]
    fn numbered_from_black()
    {
        let (_, mut position) = line(&["e2e4", "e7e5", "g1f3"]);
        let mut tail = Line::default();
        for uci in ["b8c6", "f1b5", "a7a6"]
        {
            let (next, ply) = chess::play_uci(&position, uci).unwrap();
            tail.push(ply).unwrap();
            position = next;
        }
        assert_eq!(tail.movetext(Color::Black, 2), "2... Nc6 3. Bb5 a6");
    }

    #[test]
    fn concatenation()
    {
        let (head, _) = line(&["e2e4", "e7e5"]);
        let (whole, _) = line(&["e2e4", "e7e5", "g1f3"]);
        let joined = head.then(&Line::default()).unwrap();
        assert_eq!(joined, head);
        assert_eq!(whole.len(), 3);
        assert_eq!(joined.then(&head).unwrap().len(), 4);
    }

    #[test]
    fn castling_san()
    {
        let (line, _) = line(&["e2e4", "e7e5", "g1f3", "b8c6", "f1c4", "g8f6", "e1g1"]);
        assert_eq!(line.last().unwrap().san, "O-O");
        assert_eq!(line.last().unwrap().uci, "e1g1");
    }

    #[test]
    fn bounded_length()
    {
        let mut line = Line::default();
        let ply = Ply {
            uci: "g1f3".into(),
            san: "Nf3".into(),
        };
        for _ in 0 .. MAXIMUM_PLY
        {
            line.push(ply.clone()).unwrap();
        }
        assert_eq!(line.push(ply).unwrap_err().kind, Kind::InvalidState);
    }
}
