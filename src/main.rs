//! itest - config-driven integration test runner
//!
//! Runs YAML-defined test suites against a live application and the services
//! it depends on.

use clap::Parser;
use commands::Commands;
use itest::{cli, commands, common};

#[derive(Parser)]
#[command(name = "itest", about = "Config-driven integration test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    common::logging::init_cli(cli.command.verbose());

    match cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
