use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use serde::Deserialize;
use shakmaty::{fen::Fen, Chess, EnPassantMode};
use url::Url;

use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
/// How to query the opening explorer.
pub struct ExplorerConfig
{
    pub endpoint: String,
    /// Comma-separated rating buckets.
    pub ratings:  String,
    /// Comma-separated time controls.
    pub speeds:   String,
    /// How many of the most played moves to request.
    pub moves:    usize,
    pub token:    Option<String>,
    /// The minimum spacing between two requests, shared by all workers.
    pub pacing:   Duration,
    pub timeout:  Duration,
}

impl Default for ExplorerConfig
{
    fn default() -> Self
    {
        ExplorerConfig {
            endpoint: "https://explorer.lichess.ovh/lichess".into(),
            ratings:  "1600,1800,2000,2200,2500".into(),
            speeds:   "blitz,rapid,classical".into(),
            moves:    10,
            token:    None,
            pacing:   Duration::from_millis(500),
            timeout:  Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
/// A popularity oracle backed by the Lichess opening explorer.
pub struct LichessExplorer
{
    config:       ExplorerConfig,
    client:       reqwest::blocking::Client,
    endpoint:     Url,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Deserialize)]
struct ExplorerResponse
{
    #[serde(default)]
    white: u64,
    #[serde(default)]
    draws: u64,
    #[serde(default)]
    black: u64,
    /// Kept loose so that one bad move does not spoil the rest.
    #[serde(default)]
    moves: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct MoveStats
{
    uci:   String,
    san:   String,
    #[serde(default)]
    white: u64,
    #[serde(default)]
    draws: u64,
    #[serde(default)]
    black: u64,
}

impl LichessExplorer
{
    /// Creates a client for the configured explorer endpoint.
    pub fn new(config: ExplorerConfig) -> Result<LichessExplorer>
    {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| Error::new(Kind::ConfigError, format!("{}: {}", config.endpoint, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::new(Kind::ConfigError, e.to_string()))?;

        Ok(LichessExplorer {
            config,
            client,
            endpoint,
            last_request: Mutex::new(None),
        })
    }

    /// Blocks until the pacing interval since the previous request has elapsed.
    ///
    /// The lock is held while sleeping, so concurrent workers queue up behind each other.
    fn pace(&self)
    {
        let mut last = self.last_request.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last
        {
            let elapsed = previous.elapsed();
            if elapsed < self.config.pacing
            {
                std::thread::sleep(self.config.pacing - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    /// Builds the query url for a position.
    fn url(&self, fen: &str) -> Url
    {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("fen", fen)
            .append_pair("ratings", &self.config.ratings)
            .append_pair("speeds", &self.config.speeds)
            .append_pair("moves", &self.config.moves.to_string());
        url
    }
}

impl PopularityOracle for LichessExplorer
{
    fn popular_moves(&self, position: &Chess) -> Result<Vec<Candidate>>
    {
        let fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
        self.pace();

        let mut request = self.client.get(self.url(&fen));
        if let Some(token) = &self.config.token
        {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();

        if status.as_u16() == 429
        {
            return Err(Error::new(Kind::RateLimited, format!("explorer answered {}", status)));
        }
        if status.is_server_error()
        {
            return Err(Error::new(Kind::TransientSourceError, format!("explorer answered {}", status)));
        }
        if !status.is_success()
        {
            return Err(Error::new(Kind::MalformedResponse, format!("explorer answered {} for {}", status, fen)));
        }

        let body = response.text()?;
        let candidates = parse_response(&body)?;
        log::trace!("explorer returned {} candidates for {}", candidates.len(), fen);
        Ok(candidates)
    }
}

/// Turns an explorer response body into candidates, most played first.
///
/// Individual malformed moves are dropped; a body that is not an explorer response at all is an error.
pub(crate) fn parse_response(body: &str) -> Result<Vec<Candidate>>
{
    let response: ExplorerResponse =
        serde_json::from_str(body).map_err(|e| Error::new(Kind::MalformedResponse, format!("explorer body: {}", e)))?;

    let mut stats = Vec::with_capacity(response.moves.len());
    for value in response.moves
    {
        match serde_json::from_value::<MoveStats>(value.clone())
        {
            | Ok(s) => stats.push(s),
            | Err(e) => log::warn!("discarding malformed explorer move {}: {}", value, e),
        }
    }

    let position_total = response.white + response.draws + response.black;
    let total = if position_total > 0
    {
        position_total
    }
    else
    {
        stats.iter().map(|s| s.white + s.draws + s.black).sum()
    };

    let mut candidates = stats
        .into_iter()
        .map(|s| {
            let games = s.white + s.draws + s.black;
            Candidate {
                uci: s.uci,
                san: s.san,
                games,
                frequency: if total > 0 { games as f64 / total as f64 } else { 0.0 },
                white: s.white,
                draws: s.draws,
                black: s.black,
            }
        })
        .collect::<Vec<_>>();

    candidates.sort_by(|a, b| b.games.cmp(&a.games));
    Ok(candidates)
}
