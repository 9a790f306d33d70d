use fern::{Dispatch, InitError};
use log::LevelFilter;
use std::io;

/// Maps the `--quiet` and `--verbose` flags to a level, `Info` by default.
pub fn level(quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Off
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

pub fn setup(filter: LevelFilter) -> Result<(), InitError> {
    Dispatch::new()
        // Exclude logs for crates that we use
        .level(LevelFilter::Off)
        .level_for("system76_aspm", filter)
        .format(move |out, message, record| {
            if filter >= LevelFilter::Debug {
                out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
            } else {
                out.finish(format_args!("[{}] {}", record.level(), message))
            }
        })
        .chain(io::stderr())
        .apply()?;
    Ok(())
}
