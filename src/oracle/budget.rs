use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

lazy_static! {
    static ref CLOCK: Regex = Regex::new(r"^(?<h>[0-9]{2,3}):(?<m>[0-9]{2}):(?<s>[0-9]{2})$").unwrap();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How much work the engine may spend on a single reply.
pub enum SearchBudget
{
    Depth(u32),
    Time(Duration),
}

impl Default for SearchBudget
{
    fn default() -> Self
    {
        SearchBudget::Depth(40)
    }
}

impl SearchBudget
{
    /// The UCI command that starts a search under this budget.
    pub fn go(&self) -> String
    {
        match self
        {
            | Self::Depth(d) => format!("go depth {}", d),
            | Self::Time(t) => format!("go movetime {}", t.as_millis()),
        }
    }

    /// How long the search is expected to take, when that is known up front.
    pub fn expected(&self) -> Option<Duration>
    {
        match self
        {
            | Self::Depth(_) => None,
            | Self::Time(t) => Some(*t),
        }
    }

    /// Tries to parse args into a search budget.
    ///
    /// Accepts `depth <plies>`, `time <hh:mm:ss>` and `movetime <milliseconds>`.
    pub fn parse(args: &[&str]) -> Result<SearchBudget>
    {
        let base = Error::for_parse::<Self>(args.join(" "));

        if args.len() != 2
        {
            let err = Error::new(
                Kind::ParseError,
                "Search budgets require a mode (depth, time or movetime) and a corresponding value.".into(),
            );
            return Err(err.chain(base));
        }

        match args[0]
        {
            | "depth" =>
            {
                let Ok(depth) = args[1].parse::<u32>()
                else
                {
                    let err = Error::for_parse::<u32>(args[1].to_owned());
                    return Err(err.chain(base));
                };
                if depth == 0
                {
                    return Err(Error::new(Kind::ParseError, "The depth must be at least one ply.".into()).chain(base));
                }
                Ok(SearchBudget::Depth(depth))
            }
            | "time" => parse_clock(args[1]).and_then(Self::nonzero).map_err(|e| e.chain(base)),
            | "movetime" =>
            {
                let Ok(millis) = args[1].parse::<u64>()
                else
                {
                    let err = Error::for_parse::<Duration>(args[1].to_owned());
                    return Err(err.chain(base));
                };
                Self::nonzero(Duration::from_millis(millis)).map_err(|e| e.chain(base))
            }
            | _ => Err(base),
        }
    }

    /// Rejects an empty time budget, which would make the engine return instantly.
    fn nonzero(time: Duration) -> Result<SearchBudget>
    {
        if time.is_zero()
        {
            Err(Error::new(Kind::ParseError, "The time budget must not be zero.".into()))
        }
        else
        {
            Ok(SearchBudget::Time(time))
        }
    }
}

/// Parses a wall-clock duration written as `hh:mm:ss`.
pub fn parse_clock(text: &str) -> Result<Duration>
{
    let Some(caps) = CLOCK.captures(text)
    else
    {
        let err = Error::new(Kind::ParseError, "Expected duration in the form of hh:mm:ss".into());
        return Err(err.chain(Error::for_parse::<Duration>(text.into())));
    };

    let field = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or("0").parse::<u64>().unwrap_or(0);
    Ok(Duration::from_secs(field("s") + 60 * field("m") + 3600 * field("h")))
}

impl std::fmt::Display for SearchBudget
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            | Self::Depth(d) => write!(f, "depth {}", d),
            | Self::Time(t) => write!(f, "movetime {}", t.as_millis()),
        }
    }
}

impl FromStr for SearchBudget
{
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
    {
        let args = s.split_whitespace().collect::<Vec<_>>();
        SearchBudget::parse(&args)
    }
}
