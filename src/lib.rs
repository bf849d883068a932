pub mod chess;
pub(crate) mod driver;
pub(crate) mod error;
pub mod explore;
pub mod options;
pub mod oracle;
pub mod record;
pub mod store;

#[allow(unused)]
pub mod prelude
{
    pub use std::str::FromStr;

    pub use log::{self};

    pub use crate::{
        chess::{self, game_over, parse_movetext, GameOverReason, Line, Ply, PositionKey, Replay, Root, RootRecord, MAXIMUM_PLY},
        driver::{Driver, DriverOptions},
        error::{Error, Kind, Result},
        explore::*,
        options::*,
        oracle::*,
        record::*,
        store::*,
    };
}
