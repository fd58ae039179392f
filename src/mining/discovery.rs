//! Test-target discovery.
//!
//! Finds test files in a checkout, follows their `from <module> import`
//! statements to modules of the same repository, and extracts the
//! candidates of each imported module.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::store::write_json_atomic;
use crate::errors::{Error, Result};
use crate::observability::{set_phase, MiningPhase};
use crate::python::parser::{node_text, visit_preorder};
use crate::python::{parse_python, read_source_lossy, CodeUnit, UnitExtractor};

/// A test file and one module it imports, with that module's candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTarget {
    pub test_file: PathBuf,
    pub module_file: PathBuf,
    pub units: Vec<CodeUnit>,
}

/// Walks a checkout and pairs test files with the modules they import.
pub struct TargetDiscovery<'a> {
    extractor: &'a UnitExtractor,
    exclude: Vec<Pattern>,
    max_targets: usize,
    skip_test_modules: bool,
}

// =============================================================================
// Pure Predicates
// =============================================================================

/// Case-insensitive: starts with `test` or ends with `test.py`.
pub fn is_test_name(name: &str) -> bool {
    let name = name.to_lowercase();
    name.starts_with("test") || name.ends_with("test.py")
}

fn is_python_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("py")
}

/// `a.b.c` becomes `a/b/c.py`.
fn module_relative_path(module: &str) -> PathBuf {
    let mut path: PathBuf = module.split('.').collect();
    path.set_extension("py");
    path
}

/// Modules named by `from <module> import ...` statements, leading dots
/// removed, in source order.
pub fn imported_modules(source: &str, path: &Path) -> Vec<String> {
    let Ok(module) = parse_python(source, path) else {
        return Vec::new();
    };
    let mut modules = Vec::new();
    visit_preorder(module.root(), |node, _| {
        if node.kind() != "import_from_statement" {
            return;
        }
        let Some(name) = node.child_by_field_name("module_name") else {
            return;
        };
        let dotted = node_text(&name, &module.source).trim_start_matches('.').trim();
        if !dotted.is_empty() {
            modules.push(dotted.to_string());
        }
    });
    modules
}

// =============================================================================
// I/O - Discovery
// =============================================================================

impl<'a> TargetDiscovery<'a> {
    pub fn new(extractor: &'a UnitExtractor, exclude: &[String], max_targets: usize) -> Result<Self> {
        let exclude = exclude
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| Error::Configuration(format!("invalid exclude pattern {}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            extractor,
            exclude,
            max_targets,
            skip_test_modules: true,
        })
    }

    /// Skip imported modules whose file name looks like a test module.
    pub fn skip_test_modules(mut self, skip: bool) -> Self {
        self.skip_test_modules = skip;
        self
    }

    fn root(&self) -> &Path {
        self.extractor.repo_root()
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(self.root()).unwrap_or(path);
        self.exclude.iter().any(|p| p.matches_path(relative))
    }

    /// Python files and directories under the root, sorted by name.
    fn walk(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut skipped = 0usize;
        let walker = WalkDir::new(self.root())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if skipped < 10 {
                        log::warn!("Skipping directory entry: {}", err);
                    }
                    skipped += 1;
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                dirs.push(path.to_path_buf());
            } else if entry.file_type().is_file() && is_python_file(path) && !self.is_excluded(path) {
                files.push(path.to_path_buf());
            }
        }
        if skipped > 10 {
            log::warn!("Skipped {} additional directory entries", skipped - 10);
        }
        (files, dirs)
    }

    fn contains_tests(&self, path: &Path) -> bool {
        let Ok(source) = read_source_lossy(path) else {
            return false;
        };
        match parse_python(&source, path) {
            Ok(module) => module.function_sites().iter().any(|s| is_test_name(&s.name)),
            Err(_) => false,
        }
    }

    /// Modules of this repository imported by `test_file`.
    fn resolve_imports(&self, test_file: &Path, dirs: &[PathBuf]) -> Vec<PathBuf> {
        let Ok(source) = read_source_lossy(test_file) else {
            return Vec::new();
        };
        let test_name = test_file.file_name();

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for module in imported_modules(&source, test_file) {
            let relative = module_relative_path(&module);
            if relative.file_name() == test_name {
                continue;
            }
            let Some(path) = dirs
                .iter()
                .map(|dir| dir.join(&relative))
                .find(|candidate| candidate.is_file())
            else {
                continue;
            };
            if seen.insert(path.clone()) {
                log::debug!(
                    "{} imports {}",
                    test_file.display(),
                    path.display()
                );
                resolved.push(path);
            }
        }
        resolved
    }

    /// Collect targets, stopping once more than `max_targets` are found.
    pub fn discover(&self) -> Result<Vec<TestTarget>> {
        let _phase = set_phase(MiningPhase::Discovery);
        let (files, dirs) = self.walk();

        let mut targets = Vec::new();
        for test_file in files.iter().filter(|f| self.contains_tests(f)) {
            for module_file in self.resolve_imports(test_file, &dirs) {
                let is_test_module = module_file
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("test"));
                if self.skip_test_modules && is_test_module {
                    continue;
                }
                let units = match self.extractor.extract_file(&module_file) {
                    Ok(units) => units,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", module_file.display(), e);
                        continue;
                    }
                };
                if units.is_empty() {
                    continue;
                }
                targets.push(TestTarget {
                    test_file: test_file.clone(),
                    module_file,
                    units,
                });
            }
            if targets.len() > self.max_targets {
                log::info!("Stopping discovery at {} targets", targets.len());
                break;
            }
        }

        log::info!(
            "Discovered {} test target(s) in {}",
            targets.len(),
            self.root().display()
        );
        Ok(targets)
    }

    /// Reuse the cached targets at `cache` or discover and cache them.
    pub fn load_or_discover(&self, cache: &Path) -> Result<Vec<TestTarget>> {
        if cache.is_file() {
            let contents = fs::read_to_string(cache).map_err(|e| Error::io_at(cache, e))?;
            let targets: Vec<TestTarget> = serde_json::from_str(&contents)?;
            log::info!(
                "Using {} cached test target(s) from {}",
                targets.len(),
                cache.display()
            );
            return Ok(targets);
        }
        let targets = self.discover()?;
        write_json_atomic(cache, &targets)?;
        Ok(targets)
    }
}
