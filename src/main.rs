use clap::Parser;
use flexi_logger::{AdaptiveFormat, Logger, WriteMode};
use repertoire::prelude::*;

fn main() -> Result<()>
{
    // Read the dotenv file.
    dotenvy::dotenv().ok();

    // Parse the cli options.
    let options = DriverOptions::parse();

    // Set the logger to write-and-flush so that it doesn't compete with worker threads.
    let _logger = Logger::try_with_env_or_str(options.log_level.clone())?
        .write_mode(WriteMode::BufferAndFlush)
        .log_to_stderr()
        .adaptive_format_for_stderr(AdaptiveFormat::WithThread)
        .set_palette("b196;208;195;111;67".to_owned())
        .start()?;

    // Display the package information.
    print_header();

    // Explore, then write whatever was found.
    match Driver::new(options).run()
    {
        | Ok(outcome) => log::info!("finished: {}", outcome),
        | Err(e) =>
        {
            log::error!("fatal error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_header()
{
    log::info!("♞ starting {} v{} ♞", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    log::debug!("popularity picks the moves, the engine picks the replies");
}
