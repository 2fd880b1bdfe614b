//! behat-bridge - module-aware Behat suite resolution and test session state
//!
//! Resolves which suite configuration a run registers for a module, and
//! lets the test runner see emails sent by the application under test.

use behat_bridge::commands::{Commands, GlobalOptions};
use behat_bridge::{cli, common::logging};
use clap::Parser;

#[derive(Parser)]
#[command(name = "behat-bridge", about = "Module-aware Behat suites and shared test session state")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();

    logging::init_cli(cli.global.verbose);

    match cli::dispatch(&cli.global, cli.command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(if e.is_resolution_error() { 2 } else { 1 });
        }
    }
}
