//! CLI command handling
//!
//! Dispatches CLI commands to the test engine and formats output.

use std::path::Path;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::Result;
use crate::plugins::registry::{builtin_plugins, PluginKind};
use crate::plugins::Registry;
use crate::testing::{self, Resolved, Runner};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    let registry = Registry::builtin();
    match command {
        Commands::Run { config, .. } => {
            let resolved = load_and_resolve(&config, &registry)?;
            let summary = Runner::new(resolved).run().await;
            Ok(summary.exit_code())
        }

        Commands::List { config } => {
            let resolved = load_and_resolve(&config, &registry)?;
            if resolved.tests.is_empty() {
                println!("No tests resolved");
                return Ok(testing::EXIT_NO_TESTS);
            }
            for test in &resolved.tests {
                println!("{}", test.name);
            }
            println!(
                "\n{} test(s), {} environment initializer(s)",
                resolved.tests.len(),
                resolved.environment.len()
            );
            Ok(0)
        }

        Commands::Plugins => {
            for kind in [
                PluginKind::Requester,
                PluginKind::Service,
                PluginKind::EnvironmentInitializer,
            ] {
                println!("{}", format!("{}s:", kind).cyan());
                for name in registry.names(kind) {
                    let description = builtin_plugins()
                        .iter()
                        .find(|info| info.kind == kind && info.name == name)
                        .map(|info| info.description)
                        .unwrap_or("");
                    println!("  {:12} {}", name, description.dimmed());
                }
            }
            Ok(0)
        }
    }
}

fn load_and_resolve(path: &Path, registry: &Registry) -> Result<Resolved> {
    let config = testing::load(path)?;
    testing::resolve(&config, registry)
}
