use std::{
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

use shakmaty::{fen::Fen, Chess, EnPassantMode};

use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
/// How to launch and configure a UCI engine.
pub struct EngineConfig
{
    pub path:      PathBuf,
    pub threads:   usize,
    pub hash_mb:   usize,
    /// How long a search may overrun its budget before it counts as timed out.
    ///
    /// Depth budgets have no expected duration, so for them this is the whole allowance.
    pub grace:     Duration,
    /// How long the engine may take to answer `uci` and `isready`.
    pub handshake: Duration,
}

impl EngineConfig
{
    pub fn new(path: PathBuf) -> EngineConfig
    {
        EngineConfig {
            path,
            threads: 8,
            hash_mb: 2048,
            grace: Duration::from_secs(600),
            handshake: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The parts of the engine's output we care about.
enum EngineLine
{
    BestMove(Option<String>),
    Score(Score),
    Other,
}

/// A running engine process and the line stream of its stdout.
struct EngineProcess
{
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

impl EngineProcess
{
    /// Starts the engine and waits for it to be ready.
    fn spawn(config: &EngineConfig) -> Result<EngineProcess>
    {
        let mut child = Command::new(&config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::new(Kind::EngineUnavailable, format!("{}: {}", config.path.display(), e)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take())
        else
        {
            let _ = child.kill();
            return Err(Error::new(Kind::EngineUnavailable, "engine pipes were not captured".into()));
        };

        // The reader thread ends by itself when the process closes its stdout.
        let (sender, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok())
            {
                if sender.send(line).is_err()
                {
                    break;
                }
            }
        });

        let mut process = EngineProcess { child, stdin, lines };
        process.send("uci")?;
        process.expect("uciok", config.handshake)?;
        process.send(&format!("setoption name Threads value {}", config.threads))?;
        process.send(&format!("setoption name Hash value {}", config.hash_mb))?;
        process.sync(config.handshake)?;

        log::debug!("engine {} is ready (pid {})", config.path.display(), process.child.id());
        Ok(process)
    }

    /// Waits for a line starting with the given token.
    fn expect(&mut self, token: &str, within: Duration) -> Result<()>
    {
        let deadline = Instant::now() + within;
        loop
        {
            let line = self.next_line(deadline)?;
            if line.split_whitespace().next() == Some(token)
            {
                return Ok(());
            }
        }
    }

    /// Receives the next line, unless the deadline passes or the process goes away first.
    fn next_line(&mut self, deadline: Instant) -> Result<String>
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(remaining)
        {
            | Ok(line) => Ok(line),
            | Err(RecvTimeoutError::Timeout) => Err(Error::empty(Kind::EngineTimeout)),
            | Err(RecvTimeoutError::Disconnected) => Err(Error::new(Kind::EngineUnavailable, "engine closed its output".into())),
        }
    }

    /// Runs one search, returning the engine's best move and its last reported score.
    fn search(&mut self, fen: &str, budget: &SearchBudget, grace: Duration, handshake: Duration) -> Result<EngineReply>
    {
        self.sync(handshake)?;
        self.send(&format!("position fen {}", fen))?;
        self.send(&budget.go())?;

        let deadline = Instant::now() + budget.expected().unwrap_or_default() + grace;
        let mut score = None;

        loop
        {
            let line = match self.next_line(deadline)
            {
                | Ok(line) => line,
                | Err(err) if err.kind == Kind::EngineTimeout =>
                {
                    // Ask the engine to give up so that it is usable for the next position.
                    self.send("stop")?;
                    self.expect("bestmove", handshake)?;
                    return Err(Error::new(Kind::EngineTimeout, format!("no reply within {} for {}", budget, fen)));
                }
                | Err(err) => return Err(err),
            };

            match parse_line(&line)
            {
                | EngineLine::Score(s) => score = Some(s),
                | EngineLine::BestMove(Some(uci)) => return Ok(EngineReply { uci, score }),
                | EngineLine::BestMove(None) => return Err(Error::new(Kind::MalformedResponse, format!("engine found no move for {}", fen))),
                | EngineLine::Other => log::trace!("engine: {}", line),
            }
        }
    }

    /// Writes a command to the engine.
    fn send(&mut self, command: &str) -> Result<()>
    {
        writeln!(self.stdin, "{}", command)
            .and_then(|_| self.stdin.flush())
            .map_err(|e| Error::new(Kind::EngineUnavailable, format!("could not send '{}': {}", command, e)))
    }

    /// Makes sure every earlier output has been consumed.
    fn sync(&mut self, within: Duration) -> Result<()>
    {
        self.send("isready")?;
        self.expect("readyok", within)
    }
}

impl Drop for EngineProcess
{
    fn drop(&mut self)
    {
        let _ = self.send("quit");
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline
        {
            if let Ok(Some(_)) = self.child.try_wait()
            {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A response oracle that drives a UCI engine process.
///
/// The process is owned entirely by the adapter: if it dies, it is restarted and the call is retried once.
pub struct UciEngine
{
    config:  EngineConfig,
    process: Option<EngineProcess>,
}

impl UciEngine
{
    /// Launches the engine.
    pub fn new(config: EngineConfig) -> Result<UciEngine>
    {
        let process = EngineProcess::spawn(&config)?;
        Ok(UciEngine {
            config,
            process: Some(process),
        })
    }

    /// Runs one search on the current process, starting one if there is none.
    fn attempt(&mut self, fen: &str, budget: &SearchBudget) -> Result<EngineReply>
    {
        if self.process.is_none()
        {
            self.process = Some(EngineProcess::spawn(&self.config)?);
        }

        let Some(process) = self.process.as_mut()
        else
        {
            return Err(Error::empty(Kind::EngineUnavailable));
        };

        let result = process.search(fen, budget, self.config.grace, self.config.handshake);
        if let Err(err) = &result
        {
            // A process that could not be brought back to a clean state is not reused.
            if err.kind == Kind::EngineUnavailable || (err.kind == Kind::EngineTimeout && process.sync(self.config.handshake).is_err())
            {
                self.process = None;
            }
        }
        result
    }
}

impl ResponseOracle for UciEngine
{
    fn best_reply(&mut self, position: &Chess, budget: &SearchBudget) -> Result<EngineReply>
    {
        let fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();

        match self.attempt(&fen, budget)
        {
            | Err(err) if err.kind == Kind::EngineUnavailable =>
            {
                log::warn!("engine became unavailable, restarting it once\n{err}");
                self.process = None;
                self.attempt(&fen, budget)
            }
            | result => result,
        }
    }
}

/// Classifies one line of engine output.
fn parse_line(line: &str) -> EngineLine
{
    let tokens = line.split_whitespace().collect::<Vec<_>>();

    match tokens.first().copied()
    {
        | Some("bestmove") => match tokens.get(1).copied()
        {
            | None | Some("(none)") | Some("0000") => EngineLine::BestMove(None),
            | Some(uci) => EngineLine::BestMove(Some(uci.to_owned())),
        },
        | Some("info") =>
        {
            // Secondary lines of a multi-pv search say nothing about the best move.
            if let Some(i) = tokens.iter().position(|t| *t == "multipv")
            {
                if tokens.get(i + 1).copied() != Some("1")
                {
                    return EngineLine::Other;
                }
            }

            let Some(i) = tokens.iter().position(|t| *t == "score")
            else
            {
                return EngineLine::Other;
            };

            let value = tokens.get(i + 2).and_then(|v| v.parse::<i32>().ok());
            match (tokens.get(i + 1).copied(), value)
            {
                | (Some("cp"), Some(cp)) => EngineLine::Score(Score::Centipawns(cp)),
                | (Some("mate"), Some(n)) => EngineLine::Score(Score::Mate(n)),
                | _ => EngineLine::Other,
            }
        }
        | _ => EngineLine::Other,
    }
}
