use repertoire::prelude::*;

pub fn setup() -> Result<()>
{
    env_logger::try_init().map_err(|_| Error::new(Kind::InternalError, "Could not initialize logger.".into()))
}

/// The analysis root reached by a move text from the standard position.
pub fn root(moves: &str) -> Root
{
    Root::new(None, moves).unwrap()
}

/// The key of the position reached by a move text from the standard position.
pub fn key(moves: &str) -> PositionKey
{
    root(moves).key().clone()
}

/// Options for in-process oracles: no game-count floor and no waiting between retries.
pub fn options(max_depth: u32, breadth: usize, min_frequency: f64) -> ExploreOptions
{
    ExploreOptions {
        max_depth,
        breadth,
        min_frequency,
        min_games: 0,
        retry: RetryPolicy::immediate(3),
        ..ExploreOptions::default()
    }
}
