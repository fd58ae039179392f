use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::MiningOverrides;
use crate::config::{load_config, load_config_from, load_registry, RepoSpec, SyncforgeConfig};
use crate::mining::mine_repository;

pub struct MineConfig {
    pub registry: PathBuf,
    pub repo_id: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub overrides: MiningOverrides,
}

/// Explicit `--config` file, else the nearest `.syncforge.toml`.
pub fn resolve_config(overrides: &MiningOverrides) -> Result<SyncforgeConfig> {
    let mut config = match &overrides.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => load_config(),
    };
    apply_overrides(&mut config, overrides);
    Ok(config)
}

/// CLI flags win over file values.
pub fn apply_overrides(config: &mut SyncforgeConfig, overrides: &MiningOverrides) {
    if let Some(mode) = overrides.unittest_mode {
        config.mining.unittest_mode = mode;
    }
    if let Some(mode) = overrides.commit_trace {
        config.mining.commit_trace = mode;
    }
    if let Some(method) = overrides.execution {
        config.mining.execution = method;
    }
    if let Some(timeout) = overrides.timeout {
        config.mining.timeout_seconds = timeout;
    }
    if overrides.strict_filter {
        config.mining.strict_unit_filter = true;
    }
    if let Some(root) = &overrides.work_root {
        config.paths.work_root = root.clone();
    }
}

/// Registry entries selected by id or by index range.
pub fn select_repos(
    repos: Vec<RepoSpec>,
    repo_id: Option<&str>,
    start: Option<usize>,
    end: Option<usize>,
) -> Vec<RepoSpec> {
    if let Some(id) = repo_id {
        return repos.into_iter().filter(|r| r.identity.id == id).collect();
    }
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(repos.len()).min(repos.len());
    repos
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i >= start && *i < end)
        .map(|(_, r)| r)
        .collect()
}

pub fn run_mine(config: MineConfig) -> Result<()> {
    let settings = resolve_config(&config.overrides)?;
    let repos = load_registry(&config.registry)
        .with_context(|| format!("Failed to load registry {}", config.registry.display()))?;
    let selected = select_repos(repos, config.repo_id.as_deref(), config.start, config.end);
    if selected.is_empty() {
        anyhow::bail!("No repositories selected from {}", config.registry.display());
    }

    let mut failures = 0;
    for repo in &selected {
        println!("{} {}", "Mining".bold().cyan(), repo.label());
        match mine_repository(repo, &settings) {
            Ok(summary) => println!(
                "  {} {} new, {} total ({} of {} test targets abandoned) -> {}",
                "✓".green(),
                summary.accepted,
                summary.total_instances,
                summary.abandoned_targets,
                summary.targets,
                summary.dataset_path.display()
            ),
            Err(e) => {
                failures += 1;
                log::error!("Mining {} failed: {}", repo.label(), e);
                println!("  {} {}", "✗".red(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} repositories failed", failures, selected.len());
    }
    Ok(())
}
