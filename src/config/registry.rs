//! Repository registry: which repositories to mine and how to set them up.
//!
//! The registry is a JSON array. Records may omit most fields; missing values
//! are filled from the record's position and URL.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{Error, Result};
use crate::execution::runner::TestRunner;

const DEFAULT_PYTHON_VERSION: &str = "3.11";

/// Accepts either a single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) if s.trim().is_empty() => Vec::new(),
            Self::One(s) => vec![s],
            Self::Many(v) => v.into_iter().filter(|s| !s.trim().is_empty()).collect(),
        }
    }
}

/// Accepts an id written either as a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RawRepoRecord {
    repo_id: Option<RawId>,
    repo_name: Option<String>,
    github_link: Option<String>,
    python_version: Option<String>,
    test_method: Option<String>,
    requirements: Option<OneOrMany>,
    install_command: Option<OneOrMany>,
    additional_unittest_command: Option<String>,
    image_id: Option<String>,
}

/// Identity of a repository as recorded in dataset instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A normalized registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSpec {
    pub identity: RepoIdentity,
    pub python_version: String,
    pub runner: TestRunner,
    /// Pinned requirements; take precedence over `install_commands`
    pub requirements: Vec<String>,
    pub install_commands: Vec<String>,
    /// Extra arguments appended to every test invocation
    pub extra_test_args: String,
    /// Prebuilt image; skips lookup and build when set
    pub image_id: Option<String>,
}

impl RepoSpec {
    /// Minimal record for a repository URL, with every default applied.
    pub fn from_url(index: usize, url: &str) -> Result<Self> {
        normalize(
            index,
            RawRepoRecord {
                repo_id: None,
                repo_name: None,
                github_link: Some(url.to_string()),
                python_version: None,
                test_method: None,
                requirements: None,
                install_command: None,
                additional_unittest_command: None,
                image_id: None,
            },
        )
    }

    /// Directory-safe label: `{id}_{name}`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.identity.id, self.identity.name)
    }

    /// The image was supplied by the registry rather than built here.
    pub fn has_prebuilt_image(&self) -> bool {
        self.image_id.is_some()
    }
}

fn repo_name_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".git")
        .to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn normalize(index: usize, raw: RawRepoRecord) -> Result<RepoSpec> {
    let url = non_empty(raw.github_link).ok_or_else(|| {
        Error::Configuration(format!(
            "No GitHub URL provided for repository #{}",
            index + 1
        ))
    })?;

    let id = match raw.repo_id {
        Some(RawId::Number(n)) => n.to_string(),
        Some(RawId::Text(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => (index + 1).to_string(),
    };
    let name = non_empty(raw.repo_name).unwrap_or_else(|| repo_name_from_url(&url));

    let runner = match non_empty(raw.test_method) {
        Some(method) => method.parse().unwrap_or_else(|_| {
            log::warn!(
                "Unknown test method '{}' for {}; using pytest",
                method,
                name
            );
            TestRunner::Pytest
        }),
        None => TestRunner::Pytest,
    };

    Ok(RepoSpec {
        identity: RepoIdentity { id, name, url },
        python_version: non_empty(raw.python_version)
            .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string()),
        runner,
        requirements: raw.requirements.map(OneOrMany::into_vec).unwrap_or_default(),
        install_commands: raw
            .install_command
            .map(OneOrMany::into_vec)
            .unwrap_or_default(),
        extra_test_args: raw
            .additional_unittest_command
            .unwrap_or_default()
            .trim()
            .to_string(),
        image_id: non_empty(raw.image_id),
    })
}

/// Parse and normalize a registry document.
pub fn parse_registry(contents: &str) -> Result<Vec<RepoSpec>> {
    let records: Vec<RawRepoRecord> = serde_json::from_str(contents)?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, raw)| normalize(index, raw))
        .collect()
}

pub fn load_registry(path: &Path) -> Result<Vec<RepoSpec>> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
    let specs = parse_registry(&contents)?;
    log::info!("Loaded {} repositories from {}", specs.len(), path.display());
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let specs =
            parse_registry(r#"[{"github_link": "https://github.com/acme/Widgets.git"}]"#).unwrap();
        let spec = &specs[0];
        assert_eq!(spec.identity.id, "1");
        assert_eq!(spec.identity.name, "Widgets");
        assert_eq!(spec.runner, TestRunner::Pytest);
        assert_eq!(spec.python_version, "3.11");
        assert!(spec.requirements.is_empty());
        assert!(spec.image_id.is_none());
        assert_eq!(spec.label(), "1_Widgets");
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let err = parse_registry(r#"[{"repo_name": "x"}]"#).unwrap_err();
        assert!(err.to_string().contains("No GitHub URL"));
    }

    #[test]
    fn test_unknown_runner_falls_back_to_pytest() {
        let specs = parse_registry(
            r#"[{"github_link": "https://github.com/a/b", "test_method": "nose"}]"#,
        )
        .unwrap();
        assert_eq!(specs[0].runner, TestRunner::Pytest);
    }

    #[test]
    fn test_full_record() {
        let specs = parse_registry(
            r#"[{
                "repo_id": 7,
                "repo_name": "demo",
                "github_link": "https://github.com/a/demo",
                "python_version": "3.9",
                "test_method": "unittest",
                "requirements": ["numpy>=1.20", "six"],
                "install_command": "pip install -r requirements.txt",
                "additional_unittest_command": "-x",
                "image_id": ""
            }]"#,
        )
        .unwrap();
        let spec = &specs[0];
        assert_eq!(spec.identity.id, "7");
        assert_eq!(spec.runner, TestRunner::Unittest);
        assert_eq!(spec.requirements, vec!["numpy>=1.20", "six"]);
        assert_eq!(
            spec.install_commands,
            vec!["pip install -r requirements.txt"]
        );
        assert_eq!(spec.extra_test_args, "-x");
        assert!(!spec.has_prebuilt_image());
    }
}
