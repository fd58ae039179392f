//! Container runtime CLI.
//!
//! Only the text and exit-code contract of the runtime's CLI is relied on,
//! so any docker-compatible program works. Every operation is expressed in
//! terms of [`ContainerRuntime::run`], which keeps test doubles small.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::process::{run_with_timeout, ProcessOutput};
use crate::errors::{Error, Result};

/// Operations used by the provisioner and the sandboxed executor.
pub trait ContainerRuntime {
    /// Program name used in log and error messages.
    fn program(&self) -> &str;

    /// Run the runtime CLI with `args`. A non-zero exit is not an error here.
    fn run(&self, args: &[String], timeout: Option<Duration>) -> Result<ProcessOutput>;

    /// Run and fail on a non-zero exit or a timeout.
    fn run_checked(&self, args: &[String], timeout: Option<Duration>) -> Result<ProcessOutput> {
        let output = self.run(args, timeout)?;
        if output.success() {
            return Ok(output);
        }
        let message = if output.timed_out {
            "timed out".to_string()
        } else {
            format!(
                "exit code {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )
        };
        Err(Error::container(
            format!("{} {}", self.program(), args.join(" ")),
            message,
        ))
    }

    /// Local id of `image`, if present.
    fn image_id(&self, image: &str) -> Result<Option<String>> {
        let output = self.run_checked(&args(["images", "-q", image]), None)?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    fn build_image(&self, image: &str, dockerfile: &Path, context: &Path) -> Result<()> {
        let args = vec![
            "build".to_string(),
            "-t".to_string(),
            image.to_string(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            context.display().to_string(),
        ];
        self.run_checked(&args, None).map(drop)
    }

    fn pull_image(&self, image: &str) -> Result<()> {
        self.run_checked(&args(["pull", image]), None).map(drop)
    }

    fn tag_image(&self, source: &str, target: &str) -> Result<()> {
        self.run_checked(&args(["tag", source, target]), None).map(drop)
    }

    fn push_image(&self, image: &str) -> Result<()> {
        self.run_checked(&args(["push", image]), None).map(drop)
    }

    /// Force-remove an image by id.
    fn remove_image(&self, image_id: &str) -> Result<()> {
        self.run_checked(&args(["rmi", "-f", image_id]), None).map(drop)
    }

    /// Start a long-lived container that does nothing until stopped.
    fn start_detached(&self, name: &str, image: &str) -> Result<()> {
        self.run_checked(
            &args(["run", "-d", "--name", name, image, "tail", "-f", "/dev/null"]),
            None,
        )
        .map(drop)
    }

    /// `cp <container>:<source> <dest>`
    fn copy_from(&self, container: &str, source: &str, dest: &Path) -> Result<()> {
        let args = vec![
            "cp".to_string(),
            format!("{}:{}", container, source),
            dest.display().to_string(),
        ];
        self.run_checked(&args, None).map(drop)
    }

    fn stop(&self, container: &str) -> Result<()> {
        self.run_checked(&args(["stop", container]), None).map(drop)
    }

    fn remove_container(&self, container: &str) -> Result<()> {
        self.run_checked(&args(["rm", "-f", container]), None).map(drop)
    }

    /// Stop then remove `container`, logging rather than failing.
    fn teardown(&self, container: &str) {
        if let Err(e) = self.stop(container) {
            log::debug!("stop {}: {}", container, e);
        }
        if let Err(e) = self.remove_container(container) {
            log::debug!("rm {}: {}", container, e);
        }
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// The docker (or docker-compatible) command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    name: String,
}

impl DockerCli {
    /// Locate `program` on `PATH`.
    pub fn detect(program: &str) -> Result<Self> {
        let path = which::which(program).map_err(|_| {
            Error::Configuration(format!(
                "container runtime '{}' was not found on PATH",
                program
            ))
        })?;
        log::debug!("Using container runtime at {}", path.display());
        Ok(Self {
            program: path,
            name: program.to_string(),
        })
    }
}

impl ContainerRuntime for DockerCli {
    fn program(&self) -> &str {
        &self.name
    }

    fn run(&self, args: &[String], timeout: Option<Duration>) -> Result<ProcessOutput> {
        log::trace!("{} {}", self.name, args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(args);
        run_with_timeout(&mut command, timeout, None)
    }
}

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique container name for one use of `image`.
pub fn container_name(image: &str, purpose: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!(
        "{}_container__{}__{}_{}",
        sanitize(image),
        sanitize(purpose),
        chrono::Utc::now().format("%Y%m%d%H%M%S%f"),
        CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}
