use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use system76_aspm::{config::Config, logging};

mod enable;
mod list;
mod restore;

/// Utility for enabling PCIe Active State Power Management
#[derive(Parser)]
#[command(name = "system76-aspm", version, about)]
pub struct Args {
    /// Set the verbosity of logs to 'off' [default is 'info']
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Set the verbosity of logs to 'debug' [default is 'info']
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Read settings from this file [default: /etc/system76-aspm/config.toml]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory that holds backup sets, overriding the config file
    #[arg(long, global = true, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Enable(enable::Command),
    List(list::Command),
    Restore(restore::Command),
}

impl Args {
    pub fn level(&self) -> LevelFilter { logging::level(self.quiet, self.verbose) }

    pub fn run(&self) -> anyhow::Result<()> {
        let mut config = Config::load(self.config.as_deref()).context("failed to load configuration")?;
        if let Some(ref dir) = self.backup_dir {
            config.backup_dir = dir.clone();
        }

        match self.command {
            Command::Enable(ref command) => command.run(&config),
            Command::List(ref command) => command.run(&config),
            Command::Restore(ref command) => command.run(&config),
        }
    }
}
