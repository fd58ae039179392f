use std::fs;
use std::path::{Path, PathBuf};

use super::core::SyncforgeConfig;
use crate::errors::{Error, Result};

pub const CONFIG_FILE_NAME: &str = ".syncforge.toml";
const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Pure function to parse config from a TOML string
pub fn parse_config(contents: &str) -> Result<SyncforgeConfig> {
    let config = toml::from_str::<SyncforgeConfig>(contents)
        .map_err(|e| Error::Configuration(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &SyncforgeConfig) -> Result<()> {
    if config.mining.timeout_seconds == 0 {
        return Err(Error::Configuration(
            "mining.timeout_seconds must be positive".to_string(),
        ));
    }
    if config.retry.max_attempts == 0 {
        return Err(Error::Configuration(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }
    if let Some(command) = &config.formatter.command {
        if command.is_empty() {
            return Err(Error::Configuration(
                "formatter.command must name a program".to_string(),
            ));
        }
    }
    Ok(())
}

/// Load an explicitly named config file; errors are fatal.
pub fn load_config_from(path: &Path) -> Result<SyncforgeConfig> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
    let config = parse_config(&contents)?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Try loading config from a specific path, warning on anything but absence
fn try_load_config_from_path(config_path: &Path) -> Option<SyncforgeConfig> {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            // Only log actual errors, not "file not found"
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
            }
            return None;
        }
    };

    match parse_config(&contents) {
        Ok(config) => {
            log::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("{}. Using defaults.", e);
            None
        }
    }
}

/// Pure function to generate directory ancestors up to a depth limit
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Search `start` and its ancestors for `.syncforge.toml`.
pub fn discover_config(start: PathBuf) -> SyncforgeConfig {
    directory_ancestors(start, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            log::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            SyncforgeConfig::default()
        })
}

pub fn load_config() -> SyncforgeConfig {
    match std::env::current_dir() {
        Ok(dir) => discover_config(dir),
        Err(e) => {
            log::warn!(
                "Failed to get current directory: {}. Using default config.",
                e
            );
            SyncforgeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_ancestors_is_bounded() {
        let dirs: Vec<_> = directory_ancestors(PathBuf::from("/a/b/c/d"), 2).collect();
        assert_eq!(dirs, vec![PathBuf::from("/a/b/c/d"), PathBuf::from("/a/b/c")]);
    }

    #[test]
    fn test_discover_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("x").join("y");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[mining]\ntimeout_seconds = 42\n",
        )
        .unwrap();

        let config = discover_config(nested);
        assert_eq!(config.mining.timeout_seconds, 42);
    }

    #[test]
    fn test_invalid_config_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[mining]\ntimeout_seconds = 0\n",
        )
        .unwrap();

        let config = discover_config(temp.path().to_path_buf());
        assert_eq!(config.mining.timeout_seconds, 600);
    }

    #[test]
    fn test_explicit_config_errors_are_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[formatter]\ncommand = []\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }
}
