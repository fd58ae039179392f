//! Surrounding-source context for a candidate.
//!
//! A candidate's context is its declaring file plus the repository modules
//! that file imports with `from <module> import <name>`, followed one level
//! deep. Dotted and relative module paths are resolved against the repository
//! root and the importing file's directory.
//! Dotted import paths are shortened to their final segment so the snippets
//! stay meaningful once detached from the package layout.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

static FROM_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"from\s+([\w\.]+)\s+import\s+([\w_]+)").expect("valid import regex")
});

/// One file of surrounding source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    /// File name without directories, e.g. `utils.py`
    pub name: String,
    pub path: PathBuf,
    pub code: String,
}

/// Read a file, replacing undecodable bytes instead of failing.
pub fn read_source_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::io_at(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            log::debug!("{} is not valid UTF-8; decoding lossily", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

/// Rewrite `from a.b.c import x` as `from c import x`.
pub fn simplify_imports(code: &str) -> String {
    FROM_IMPORT
        .replace_all(code, |caps: &Captures<'_>| {
            let module = &caps[1];
            match module.rsplit('.').next() {
                Some(last) if !last.is_empty() => format!("from {} import {}", last, &caps[2]),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Modules named by top-level `from X import` lines, as written.
fn imported_modules(code: &str) -> Vec<&str> {
    code.lines()
        .filter(|line| line.starts_with("from "))
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect()
}

/// Files that may define `module`, most specific first.
fn module_candidates(repo_root: &Path, file_path: &Path, module: &str) -> Vec<PathBuf> {
    let dotted = module.trim_start_matches('.');
    let level = module.len() - dotted.len();
    let segments: Vec<&str> = dotted.split('.').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.last() else {
        return Vec::new();
    };
    let nested = segments.iter().collect::<PathBuf>().with_extension("py");
    let parent = file_path.parent();

    let mut candidates = Vec::new();
    if level > 0 {
        let base = parent.and_then(|dir| dir.ancestors().nth(level - 1));
        candidates.extend(base.map(|dir| dir.join(&nested)));
    } else {
        candidates.push(repo_root.join(&nested));
    }
    let file_name = format!("{}.py", last);
    candidates.extend(parent.map(|dir| dir.join(&file_name)));
    candidates.push(repo_root.join(file_name));
    candidates
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Build the context for a file whose (raw) source is already loaded.
///
/// The declaring file always comes first.
pub fn build_context(repo_root: &Path, file_path: &Path, source: &str) -> Vec<ContextFile> {
    let declaring = ContextFile {
        name: file_name_of(file_path),
        path: file_path.to_path_buf(),
        code: simplify_imports(source),
    };

    let mut context = vec![declaring];
    for module in imported_modules(source) {
        let Some(path) = module_candidates(repo_root, file_path, module)
            .into_iter()
            .find(|candidate| candidate.is_file())
        else {
            continue;
        };
        let file_name = file_name_of(&path);
        if context.iter().any(|c| c.name == file_name) {
            continue;
        }
        match read_source_lossy(&path) {
            Ok(code) => context.push(ContextFile {
                name: file_name,
                path,
                code: simplify_imports(&code),
            }),
            Err(e) => log::debug!("Skipping context dependency {}: {}", path.display(), e),
        }
    }
    context
}
