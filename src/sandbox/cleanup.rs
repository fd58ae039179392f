//! Bounded retries for flaky filesystem and container housekeeping.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use walkdir::WalkDir;

use crate::config::RetryConfig;
use crate::errors::{Error, Result};

/// Run `operation` until it succeeds or the retry budget is spent.
///
/// The closure receives the 1-based attempt number. The last error is
/// returned once `retry.max_attempts` attempts have failed.
pub fn retrying<T>(
    retry: &RetryConfig,
    label: &str,
    mut operation: impl FnMut(u32) -> Result<T>,
) -> Result<T> {
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if retry.should_retry(attempt) => {
                log::warn!(
                    "{} failed (attempt {}/{}): {}",
                    label,
                    attempt,
                    retry.max_attempts,
                    e
                );
                thread::sleep(retry.delay_for_attempt(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Remove `path` and everything below it.
///
/// Entries are removed individually (deepest first, clearing read-only bits
/// on the way), then the tree is removed as a whole. The whole pass repeats
/// until the path is gone or the retry budget runs out.
pub fn remove_dir_robust(path: &Path, retry: &RetryConfig) -> Result<()> {
    let mut attempts = 0;
    let outcome = retrying(retry, &format!("remove {}", path.display()), |attempt| {
        attempts = attempt;
        remove_pass(path).map_err(|e| Error::io_at(path, e))
    });
    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            log::error!("Giving up on removing {}: {}", path.display(), e);
            Err(Error::Cleanup {
                path: path.to_path_buf(),
                attempts,
            })
        }
    }
}

fn remove_pass(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }

    for entry in WalkDir::new(path).contents_first(true).into_iter().flatten() {
        if entry.path() == path {
            continue;
        }
        clear_readonly(entry.path());
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        if let Err(e) = removed {
            if e.kind() != io::ErrorKind::NotFound {
                log::debug!("Could not remove {}: {}", entry.path().display(), e);
            }
        }
    }

    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ if path.exists() => Err(io::Error::other("directory still present")),
        _ => Ok(()),
    }
}

fn clear_readonly(path: &Path) {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            let _ = fs::set_permissions(path, permissions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_removes_nested_tree_with_readonly_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("checkout");
        fs::create_dir_all(root.join("pkg/sub")).unwrap();
        let file = root.join("pkg/sub/module.py");
        fs::write(&file, "x = 1\n").unwrap();
        let mut permissions = fs::metadata(&file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&file, permissions).unwrap();

        remove_dir_robust(&root, &RetryConfig::immediate(3)).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_missing_path_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_dir_robust(&temp.path().join("absent"), &RetryConfig::immediate(1)).unwrap();
    }

    #[test]
    fn test_exhausted_budget_reports_attempts() {
        let temp = TempDir::new().unwrap();
        // A regular file is not a directory, so every pass fails
        let file = temp.path().join("plain.txt");
        fs::write(&file, "data").unwrap();

        let err = remove_dir_robust(&file, &RetryConfig::immediate(3)).unwrap_err();
        match err {
            Error::Cleanup { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_retrying_stops_on_success() {
        let mut seen = Vec::new();
        let value = retrying(&RetryConfig::immediate(5), "flaky", |attempt| {
            seen.push(attempt);
            if attempt < 3 {
                Err(Error::Configuration("not yet".into()))
            } else {
                Ok(attempt * 10)
            }
        })
        .unwrap();
        assert_eq!(value, 30);
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
