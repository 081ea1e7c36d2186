#![forbid(unsafe_code)]

//! bambu-monitor: Bambu Lab printer status monitor entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("bambu-monitor: {e}");
        std::process::exit(e.exit_code());
    }
}
