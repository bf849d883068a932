use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Parser;

use crate::prelude::*;

#[derive(Clone, Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct DriverOptions
{
    #[arg(short, long, default_value = "")]
    /// move text leading to the analysis root, e.g. "1. Nf3 d5 2. g3"
    pub moves: String,

    #[arg(long)]
    /// starting position, if not the standard one
    pub fen: Option<String>,

    #[arg(short, long, env = "STOCKFISH_PATH", default_value = "stockfish")]
    /// path to a UCI engine
    pub engine: PathBuf,

    #[arg(short = 'd', long, default_value_t = 12)]
    /// move pairs to explore beyond the root
    pub max_depth: u32,

    #[arg(short, long, default_value_t = 5)]
    /// most popular candidates considered per position
    pub breadth: usize,

    #[arg(long, default_value_t = 0.01)]
    /// minimum share of games a candidate must be played in
    pub min_frequency: f64,

    #[arg(long, default_value_t = 500)]
    /// minimum number of games a candidate must be played in
    pub min_games: u64,

    #[arg(long, default_value = "depth 40")]
    /// engine budget per reply: "depth N", "time hh:mm:ss" or "movetime MS"
    pub budget: SearchBudget,

    #[arg(long, default_value_t = 600)]
    /// seconds a reply may overrun its budget before it is given up on
    pub engine_timeout: u64,

    #[arg(long, default_value_t = 8)]
    /// engine threads per worker
    pub threads: usize,

    #[arg(long, default_value_t = 2048)]
    /// engine hash in MB per worker
    pub hash: usize,

    #[arg(short, long, default_value_t = 1)]
    /// number of workers, each with its own engine
    pub workers: usize,

    #[arg(long, default_value_t = false)]
    /// ignore and overwrite any previous progress
    pub fresh: bool,

    #[arg(short, long)]
    /// output directory, derived from the moves by default
    pub output: Option<PathBuf>,

    #[arg(long)]
    /// progress file, inside the output directory by default
    pub progress: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TranspositionPolicy::Record)]
    /// whether lines that transpose are written out
    pub transpositions: TranspositionPolicy,

    #[arg(long, default_value = "1600,1800,2000,2200,2500")]
    /// explorer rating buckets
    pub ratings: String,

    #[arg(long, default_value = "blitz,rapid,classical")]
    /// explorer time controls
    pub speeds: String,

    #[arg(long, default_value_t = 10)]
    /// moves requested from the explorer per position
    pub explorer_moves: usize,

    #[arg(long, default_value = "https://explorer.lichess.ovh/lichess")]
    /// opening explorer endpoint
    pub explorer_url: String,

    #[arg(long, env = "LICHESS_TOKEN", hide_env_values = true)]
    /// explorer access token
    pub token: Option<String>,

    #[arg(long, default_value_t = 5)]
    /// attempts per explorer request
    pub retries: u32,

    #[arg(long, default_value_t = 500)]
    /// minimum milliseconds between explorer requests
    pub throttle_ms: u64,

    #[arg(long)]
    /// stop after processing this many positions
    pub max_nodes: Option<usize>,

    #[arg(long, value_parser = parse_clock)]
    /// stop after this much time (hh:mm:ss)
    pub time_limit: Option<Duration>,

    #[arg(short, long, default_value = "info")]
    /// lowest log level to show
    pub log_level: String,
}

impl DriverOptions
{
    /// The exploration options these flags describe.
    pub fn explore_options(&self) -> ExploreOptions
    {
        ExploreOptions {
            max_depth:      self.max_depth,
            breadth:        self.breadth,
            min_frequency:  self.min_frequency,
            min_games:      self.min_games,
            budget:         self.budget,
            resume:         !self.fresh,
            transpositions: self.transpositions,
            retry:          RetryPolicy {
                attempts: self.retries,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn explorer_config(&self) -> ExplorerConfig
    {
        ExplorerConfig {
            endpoint: self.explorer_url.clone(),
            ratings: self.ratings.clone(),
            speeds: self.speeds.clone(),
            moves: self.explorer_moves,
            token: self.token.clone(),
            pacing: Duration::from_millis(self.throttle_ms),
            ..ExplorerConfig::default()
        }
    }

    pub fn engine_config(&self) -> EngineConfig
    {
        EngineConfig {
            threads: self.threads,
            hash_mb: self.hash,
            grace: Duration::from_secs(self.engine_timeout),
            ..EngineConfig::new(self.engine.clone())
        }
    }

    pub fn limits(&self) -> RunLimits
    {
        RunLimits {
            max_nodes:  self.max_nodes,
            time_limit: self.time_limit,
        }
    }

    /// The output directory: as given, or named after the starting moves.
    pub fn output_dir(&self) -> PathBuf
    {
        if let Some(dir) = &self.output
        {
            return dir.clone();
        }

        let slug = self
            .moves
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("_");

        match slug.is_empty()
        {
            | true => PathBuf::from("analysis_root"),
            | false => PathBuf::from(format!("analysis_{}", slug)),
        }
    }

    pub fn progress_path(&self) -> PathBuf
    {
        self.progress.clone().unwrap_or_else(|| self.output_dir().join("progress.json"))
    }
}

/// Wires the oracles, the store and the explorer together for one command-line run.
pub struct Driver
{
    options: DriverOptions,
}

impl Driver
{
    pub fn new(options: DriverOptions) -> Self
    {
        Driver { options }
    }

    /// Explores from the configured root, then writes every output.
    pub fn run(&self) -> Result<RunOutcome>
    {
        if self.options.workers == 0
        {
            return Err(Error::new(Kind::ConfigError, "At least one worker is required.".into()));
        }

        let root = Root::new(self.options.fen.as_deref(), &self.options.moves)?;
        let explore = self.options.explore_options();
        explore.validate(root.prefix())?;

        let output = self.options.output_dir();
        std::fs::create_dir_all(&output)?;

        let store = ProgressStore::open(self.options.progress_path(), root.record(), explore.traversal(), explore.resume)?;
        let popularity = LichessExplorer::new(self.options.explorer_config())?;

        log::info!("starting {} engine(s) at {}", self.options.workers, self.options.engine.display());
        let engine = self.options.engine_config();
        let responders = (0 .. self.options.workers)
            .map(|_| UciEngine::new(engine.clone()))
            .collect::<Result<Vec<_>>>()?;

        let mut explorer = TreeExplorer::new(explore.clone(), root.clone(), &store, &popularity, responders)?;
        watch_interrupts(explorer.cancel_handle());

        let outcome = explorer.run(self.options.limits())?;
        store.flush()?;

        let state = store.snapshot();
        VariationReport::new(&root, &state, &explore).write(&output)?;

        if !outcome.is_complete()
        {
            log::info!("run again with the same options to continue from {}", self.options.progress_path().display());
        }
        Ok(outcome)
    }
}

/// Sets the flag when the user interrupts the process, so that the run stops at the next batch boundary.
fn watch_interrupts(cancel: Arc<AtomicBool>)
{
    let spawned = std::thread::Builder::new().name("interrupts".into()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build()
        {
            | Ok(runtime) => runtime,
            | Err(e) =>
            {
                log::warn!("interrupts will not stop the run cleanly: {}", e);
                return;
            }
        };

        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok()
            {
                log::warn!("interrupted, stopping after the current batch");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    });

    if let Err(e) = spawned
    {
        log::warn!("interrupts will not stop the run cleanly: {}", e);
    }
}
