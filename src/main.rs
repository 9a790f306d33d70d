use clap::Parser;
use std::process;
use system76_aspm::logging;

mod cli;

fn main() {
    let args = cli::Args::parse();

    if let Err(why) = logging::setup(args.level()) {
        eprintln!("failed to set up logging: {}", why);
        process::exit(1);
    }

    if let Err(why) = args.run() {
        eprintln!("system76-aspm: {:#}", why);
        process::exit(1);
    }
}
