use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;
use shakmaty::Color;

use crate::prelude::*;

#[derive(Clone, Debug, Serialize)]
pub struct RootSummary
{
    pub fen:   Option<String>,
    pub moves: String,
    pub key:   PositionKey,
}

#[derive(Clone, Debug, Serialize)]
pub struct SettingsSummary
{
    pub max_depth:      u32,
    pub breadth:        usize,
    pub min_frequency:  f64,
    pub min_games:      u64,
    pub budget:         String,
    pub transpositions: TranspositionPolicy,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Totals
{
    pub positions:      usize,
    pub variations:     usize,
    pub transpositions: usize,
    pub failures:       usize,
    pub pending:        usize,
}

#[derive(Clone, Debug, Serialize)]
/// One recorded variation.
pub struct VariationSummary
{
    pub number:     usize,
    pub moves:      String,
    pub uci:        String,
    pub depth:      usize,
    pub end:        Leaf,
    /// The last reply's evaluation in pawns.
    pub evaluation: Option<f64>,
    pub games:      Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FailureSummary
{
    pub key:    PositionKey,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
/// The aggregate summary of an exploration, written as `complete_analysis.json`.
pub struct Summary
{
    pub root:       RootSummary,
    pub settings:   SettingsSummary,
    pub totals:     Totals,
    pub variations: Vec<VariationSummary>,
    /// Every failure recorded anywhere in the tree, so that none of them goes unnoticed.
    pub failures:   Vec<FailureSummary>,
}

/// Renders the outputs of an exploration from its persisted state.
pub struct VariationReport<'a>
{
    root:    &'a Root,
    state:   &'a ProgressState,
    options: &'a ExploreOptions,
}

impl<'a> VariationReport<'a>
{
    pub fn new(root: &'a Root, state: &'a ProgressState, options: &'a ExploreOptions) -> VariationReport<'a>
    {
        VariationReport { root, state, options }
    }

    pub fn paths(&self) -> Paths<'a>
    {
        Paths::new(self.state, self.options.transpositions)
    }

    /// Builds the aggregate summary.
    pub fn summary(&self) -> Result<Summary>
    {
        let (turn, fullmoves) = self.root.numbering();

        let variations = self
            .paths()
            .enumerate()
            .map(|(i, path)| {
                Ok(VariationSummary {
                    number:     i + 1,
                    moves:      self.root.prefix().then(&path.line)?.movetext(turn, fullmoves),
                    uci:        path.line.uci(),
                    depth:      path.depth(),
                    evaluation: path.score.map(|s| s.pawns()),
                    games:      path.games,
                    end:        path.leaf,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let failures = self
            .state
            .entries
            .iter()
            .flat_map(|(key, entry)| {
                let status = match &entry.status
                {
                    | EntryStatus::Failed { reason } => Some(reason.clone()),
                    | _ => None,
                };
                let candidates = entry.expansions.iter().filter_map(|e| match &e.outcome
                {
                    | ReplyOutcome::Failed { reason } => Some(format!("{}: {}", e.ply, reason)),
                    | _ => None,
                });
                let discarded = entry.discarded.iter().map(|d| format!("discarded {}", d));

                status
                    .into_iter()
                    .chain(candidates)
                    .chain(discarded)
                    .map(|reason| FailureSummary { key: key.clone(), reason })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        Ok(Summary {
            root: RootSummary {
                fen:   self.root.fen().map(str::to_owned),
                moves: self.root.prefix().movetext(turn, fullmoves),
                key:   self.root.key().clone(),
            },
            settings: SettingsSummary {
                max_depth:      self.options.max_depth,
                breadth:        self.options.breadth,
                min_frequency:  self.options.min_frequency,
                min_games:      self.options.min_games,
                budget:         self.options.budget.to_string(),
                transpositions: self.options.transpositions,
            },
            totals: Totals {
                positions:      self.state.entries.len(),
                variations:     variations.len(),
                transpositions: Paths::transpositions(self.state),
                failures:       self.state.entries.values().filter(|e| e.has_failures()).count(),
                pending:        self.state.frontier.len(),
            },
            variations,
            failures,
        })
    }

    /// Renders the nested tree view, one indented line per candidate/reply pair.
    pub fn tree(&self) -> Result<String>
    {
        let (turn, fullmoves) = self.root.numbering();
        let offset = self.root.prefix().len();

        let mut out = format!("Opening tree from {}\n", self.describe_root());
        let mut previous: Vec<&Ply> = Vec::new();
        let paths = self.paths().collect::<Vec<_>>();

        for path in paths.iter()
        {
            let plies = path.line.iter().collect_vec();
            let shared = previous.iter().zip(plies.iter()).take_while(|(a, b)| a == b).count() / 2;

            for (depth, pair) in plies.chunks(2).enumerate().skip(shared)
            {
                let (turn, number) = numbering_after(turn, fullmoves, offset + 2 * depth);
                let mut line = Line::default();
                for ply in pair
                {
                    line.push((*ply).clone())?;
                }

                let mut label = line.movetext(turn, number);
                if pair.len() == 2 && (depth + 1) * 2 == plies.len()
                {
                    if let Some(score) = path.score
                    {
                        label = format!("{} ({})", label, score);
                    }
                }
                out.push_str(&format!("{}{}\n", "  ".repeat(depth + 1), label));
            }

            out.push_str(&format!("{}[{}]\n", "  ".repeat(plies.len().div_ceil(2) + 1), path.leaf));
            previous = plies;
        }

        Ok(out)
    }

    /// Writes every output file into a directory, returning the number of variations written.
    pub fn write(&self, dir: &Path) -> Result<usize>
    {
        std::fs::create_dir_all(dir)?;

        let mut count = 0;
        for (i, path) in self.paths().enumerate()
        {
            let pgn = pgn::render(self.root, &path, i + 1)?;
            std::fs::write(dir.join(format!("variation_{}.pgn", i + 1)), pgn)?;
            count += 1;
        }

        let summary = serde_json::to_vec_pretty(&self.summary()?)
            .map_err(|e| Error::new(Kind::InternalError, format!("could not encode the summary: {}", e)))?;
        std::fs::write(dir.join("complete_analysis.json"), summary)?;
        std::fs::write(dir.join("variation_tree.txt"), self.tree()?)?;

        let stale = stale_variations(dir, count)?;
        for path in stale.iter()
        {
            std::fs::remove_file(path)?;
        }
        if !stale.is_empty()
        {
            log::info!("removed {} variation(s) left over from an earlier run", stale.len());
        }

        log::info!("wrote {} variation(s) to {}", count, dir.display());
        Ok(count)
    }

    fn describe_root(&self) -> String
    {
        let (turn, fullmoves) = self.root.numbering();
        let moves = self.root.prefix().movetext(turn, fullmoves);
        match (self.root.fen(), moves.is_empty())
        {
            | (None, true) => "the starting position".into(),
            | (None, false) => moves,
            | (Some(fen), true) => fen.into(),
            | (Some(fen), false) => format!("{} {}", fen, moves),
        }
    }
}

/// The variation records in a directory numbered beyond the given count.
fn stale_variations(dir: &Path, count: usize) -> Result<Vec<PathBuf>>
{
    let mut stale = Vec::new();
    for entry in std::fs::read_dir(dir)?
    {
        let entry = entry?;
        let name = entry.file_name();
        let number = name
            .to_str()
            .and_then(|n| n.strip_prefix("variation_"))
            .and_then(|n| n.strip_suffix(".pgn"))
            .and_then(|n| n.parse::<usize>().ok());

        if number.is_some_and(|n| n > count)
        {
            stale.push(entry.path());
        }
    }
    Ok(stale)
}

/// The side to move and move number after some plies from a given point.
fn numbering_after(turn: Color, fullmoves: u32, plies: usize) -> (Color, u32)
{
    let plies = plies as u32;
    match turn
    {
        | Color::White => (if plies % 2 == 0 { Color::White } else { Color::Black }, fullmoves + plies / 2),
        | Color::Black => (if plies % 2 == 0 { Color::Black } else { Color::White }, fullmoves + (plies + 1) / 2),
    }
}
