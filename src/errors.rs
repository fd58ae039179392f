//! Shared error types for the mining pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for syncforge operations
#[derive(Debug, Error)]
pub enum Error {
    /// File system related errors
    #[error("File system error: {message}")]
    FileSystem {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Python source could not be parsed
    #[error("Parse error in {file}: {message}")]
    Parse { file: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The working checkout is no longer a usable git repository
    #[error("Workspace invalid at {path}: {message}")]
    Workspace { path: PathBuf, message: String },

    /// A container runtime command failed
    #[error("Container runtime error running `{command}`: {message}")]
    Container { command: String, message: String },

    /// A local subprocess could not be run
    #[error("Failed to run `{command}`: {message}")]
    Process { command: String, message: String },

    /// No image could be located or built for a repository
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    /// A directory could not be removed within the retry budget
    #[error("Failed to remove {path} after {attempts} attempts")]
    Cleanup { path: PathBuf, attempts: u32 },

    /// A record failed constructor validation
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Generic errors with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },

    /// Wrapped external errors
    #[error(transparent)]
    External(#[from] anyhow::Error),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML errors
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// libgit2 errors
    #[error(transparent)]
    Git(#[from] git2::Error),
}

impl Error {
    /// Create a file system error with path context
    pub fn file_system(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::FileSystem {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a file system error that keeps the underlying io error
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            message: source.to_string(),
            path: Some(path.into()),
            source: Some(source),
        }
    }

    pub fn parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn workspace(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Workspace {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn container(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Container {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn process(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Process {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: self.to_string(),
        }
    }

    /// True when the checkout must be re-provisioned before continuing.
    pub fn is_workspace_invalid(&self) -> bool {
        match self {
            Self::Workspace { .. } => true,
            Self::Git(e) => matches!(
                e.code(),
                git2::ErrorCode::NotFound | git2::ErrorCode::BareRepo | git2::ErrorCode::Locked
            ),
            _ => false,
        }
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_errors_trigger_reprovisioning() {
        let err = Error::workspace("/tmp/repo", "missing .git");
        assert!(err.is_workspace_invalid());
        assert!(!Error::Configuration("bad".into()).is_workspace_invalid());
    }

    #[test]
    fn test_context_wraps_message() {
        let result: Result<()> = Err(Error::ImageUnavailable("acme/1_demo".into()));
        let err = result.context("provisioning").unwrap_err();
        assert_eq!(
            err.to_string(),
            "provisioning: Image unavailable: acme/1_demo"
        );
    }
}
