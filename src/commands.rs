//! CLI command definitions
//!
//! Defines the clap commands for the itest CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test suite
    Run {
        /// Configuration file or directory of YAML files
        config: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the tests a suite resolves to, without running them
    #[command(alias = "ls")]
    List {
        /// Configuration file or directory of YAML files
        config: PathBuf,
    },

    /// Show built-in services, requesters and environment initializers
    Plugins,
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Run { verbose: true, .. })
    }
}
