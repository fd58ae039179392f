use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use syncforge::cli::{Cli, Commands};
use syncforge::commands::{self, MineConfig};
use syncforge::observability::install_panic_hook;

// Main orchestrator function
fn main() -> Result<()> {
    install_panic_hook();
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    match cli.command {
        Commands::Mine {
            registry,
            repo_id,
            start,
            end,
            overrides,
        } => commands::run_mine(MineConfig {
            registry,
            repo_id,
            start,
            end,
            overrides,
        }),
        Commands::Trace {
            repo,
            file,
            name,
            oldest,
        } => {
            let entries = commands::trace_function(&repo, &file, &name, oldest)?;
            if entries.is_empty() {
                eprintln!("{} no historical versions of {}", "note:".yellow(), name);
            }
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Commands::ParseOutput {
            runner,
            file,
            exit_code,
        } => {
            let parsed = commands::parse_output(runner, &file, exit_code)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(())
        }
    }
}

/// `warn` by default; each `-v` raises the level. `RUST_LOG` wins.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}
