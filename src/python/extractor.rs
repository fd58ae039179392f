//! Candidate extraction from Python files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::context::{build_context, read_source_lossy, ContextFile};
use super::filter::check_unit;
use super::format::Formatter;
use super::parser::{parse_python, FunctionSite, PythonModule, UnitKind};
use super::text::{dedent, line_start};
use crate::config::RepoIdentity;
use crate::errors::{Error, Result};

/// A function or method together with its surrounding source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub kind: UnitKind,
    pub name: String,
    pub file_name: String,
    /// Absolute path inside the mining checkout
    pub file_path: PathBuf,
    pub repo: RepoIdentity,
    /// Dedented, formatted source of the definition
    pub source: String,
    /// Declaring file first, then imported siblings
    pub context: Vec<ContextFile>,
}

/// Key used to recognize a candidate across test files and runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitIdentity {
    pub kind: UnitKind,
    pub name: String,
    pub file_path: PathBuf,
}

impl CodeUnit {
    pub fn new(
        kind: UnitKind,
        name: impl Into<String>,
        file_path: impl Into<PathBuf>,
        repo: RepoIdentity,
        source: impl Into<String>,
        context: Vec<ContextFile>,
    ) -> Result<Self> {
        let name = name.into();
        let file_path = file_path.into();
        let source = source.into();

        if name.is_empty() {
            return Err(Error::InvalidRecord("code unit without a name".into()));
        }
        if source.trim().is_empty() {
            return Err(Error::InvalidRecord(format!("code unit {} has no source", name)));
        }
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidRecord(format!("code unit {} has no file", name)))?;
        if !context.iter().any(|c| c.name == file_name) {
            return Err(Error::InvalidRecord(format!(
                "context of {} does not include its declaring file {}",
                name, file_name
            )));
        }

        Ok(Self {
            kind,
            name,
            file_name,
            file_path,
            repo,
            source,
            context,
        })
    }

    pub fn identity(&self) -> UnitIdentity {
        UnitIdentity {
            kind: self.kind,
            name: self.name.clone(),
            file_path: self.file_path.clone(),
        }
    }

    /// The context entry for the file that declares this unit.
    pub fn declaring_context(&self) -> Option<&ContextFile> {
        self.context.iter().find(|c| c.name == self.file_name)
    }
}

/// Dedented, formatted source of one definition.
pub fn site_source(module: &PythonModule, site: &FunctionSite, formatter: &Formatter) -> String {
    let start = line_start(&module.source, site.def_start);
    let span = module.source.get(start..site.end_byte).unwrap_or_default();
    formatter.format(&dedent(span))
}

/// Outcome of looking up a function by name in one version of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionLookup {
    Found(String),
    /// The file does not parse at this version
    Unparsable,
    /// The file parses but has no definition with that name
    Missing,
}

/// Find the first definition named `name` (pre-order) in `source`.
pub fn lookup_function(source: &str, path: &Path, name: &str, formatter: &Formatter) -> FunctionLookup {
    let module = match parse_python(source, path) {
        Ok(module) if !module.has_errors() => module,
        _ => return FunctionLookup::Unparsable,
    };
    module
        .function_sites()
        .iter()
        .find(|site| site.name == name)
        .map(|site| FunctionLookup::Found(site_source(&module, site, formatter)))
        .unwrap_or(FunctionLookup::Missing)
}

/// Extracts candidates from files of one repository checkout.
#[derive(Debug, Clone)]
pub struct UnitExtractor {
    repo_root: PathBuf,
    repo: RepoIdentity,
    formatter: Formatter,
    strict: bool,
}

impl UnitExtractor {
    pub fn new(repo_root: impl Into<PathBuf>, repo: RepoIdentity, formatter: Formatter) -> Self {
        Self {
            repo_root: repo_root.into(),
            repo,
            formatter,
            strict: false,
        }
    }

    /// Apply the strict candidate filter to every extracted unit.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// Extract every function and method of a file.
    ///
    /// Unparsable files yield no units; only I/O failures are errors.
    pub fn extract_file(&self, path: &Path) -> Result<Vec<CodeUnit>> {
        let source = read_source_lossy(path)?;
        Ok(self.extract_source(path, &source))
    }

    pub fn extract_source(&self, path: &Path, source: &str) -> Vec<CodeUnit> {
        let module = match parse_python(source, path) {
            Ok(module) => module,
            Err(e) => {
                log::warn!("{}", e);
                return Vec::new();
            }
        };
        if module.has_errors() {
            log::warn!("Syntax error in {}; no candidates extracted", path.display());
            return Vec::new();
        }

        let context = build_context(&self.repo_root, path, source);
        module
            .function_sites()
            .iter()
            .filter_map(|site| {
                let unit = CodeUnit::new(
                    site.kind,
                    site.name.clone(),
                    path,
                    self.repo.clone(),
                    site_source(&module, site, &self.formatter),
                    context.clone(),
                );
                match unit {
                    Ok(unit) => Some(unit),
                    Err(e) => {
                        log::warn!("Skipping {} in {}: {}", site.name, path.display(), e);
                        None
                    }
                }
            })
            .filter(|unit| self.passes_filter(unit))
            .collect()
    }

    fn passes_filter(&self, unit: &CodeUnit) -> bool {
        if !self.strict {
            return true;
        }
        match check_unit(unit) {
            Ok(()) => true,
            Err(reason) => {
                log::debug!("Filtered out {} {}: {}", unit.kind, unit.name, reason);
                false
            }
        }
    }
}
