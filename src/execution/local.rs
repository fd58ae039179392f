//! Non-sandboxed execution in a persistent virtual environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::executor::{check_command_length, role_name, ExecutionRequest, TestExecutor, TestInvocation};
use super::outcome::{interpret_run, ExecutionOutcome};
use crate::config::{RepoSpec, RetryConfig};
use crate::errors::{Error, Result};
use crate::history::WorkspaceHandle;
use crate::python::{align, Formatter};
use crate::sandbox::{arg_max, run_with_timeout, CloneCheckout};

const SETUP_TIMEOUT: Duration = Duration::from_secs(1800);

/// Runs tests in `exec/` of the workspace using `test_venv/`.
///
/// The candidate is written over the real file for the duration of the run
/// and the previous content is restored afterwards.
pub struct LocalVenvExecutor {
    workspace: WorkspaceHandle,
    invocation: TestInvocation,
    formatter: Formatter,
    arg_limit: usize,
}

impl LocalVenvExecutor {
    pub fn new(workspace: WorkspaceHandle, invocation: TestInvocation, formatter: Formatter) -> Self {
        Self {
            workspace,
            invocation,
            formatter,
            arg_limit: arg_max(),
        }
    }

    pub fn with_arg_limit(mut self, limit: usize) -> Self {
        self.arg_limit = limit;
        self
    }

    fn python(&self) -> PathBuf {
        self.workspace.venv_dir().join("bin").join("python")
    }

    /// Clone the execution checkout and build the environment, once.
    ///
    /// Tooling comes first, then pinned requirements (or, without any, the
    /// declared install commands), then the project itself. Failed install
    /// steps are logged; tests decide whether the environment is usable.
    pub fn prepare(&self, repo: &RepoSpec, retry: &RetryConfig) -> Result<()> {
        let exec_dir = self.workspace.exec_dir();
        CloneCheckout::new(repo.identity.url.clone(), retry.clone()).ensure(&exec_dir, false)?;

        let python = self.python();
        if python.exists() {
            log::debug!("Reusing environment {}", self.workspace.venv_dir().display());
            return Ok(());
        }

        let venv_dir = self.workspace.venv_dir();
        let mut create = Command::new("python3");
        create.arg("-m").arg("venv").arg(&venv_dir);
        let output = run_with_timeout(&mut create, Some(SETUP_TIMEOUT), None)?;
        if !output.success() {
            return Err(Error::process(
                format!("python3 -m venv {}", venv_dir.display()),
                output.stderr.trim().to_string(),
            ));
        }

        let python = python.display().to_string();
        let mut steps = vec![
            format!("{} -m pip install --upgrade pip setuptools", python),
            format!(
                "{} -m pip install -U {}",
                python,
                repo.runner.packages().join(" ")
            ),
        ];
        if !repo.requirements.is_empty() {
            steps.extend(
                repo.requirements
                    .iter()
                    .map(|r| format!("{} -m pip install '{}'", python, r.replace(' ', ""))),
            );
        } else {
            let bin = self.workspace.venv_dir().join("bin");
            steps.extend(
                repo.install_commands
                    .iter()
                    .map(|c| format!("{}/{}", bin.display(), c)),
            );
        }
        steps.push(format!(
            "if [ -f pyproject.toml ] || [ -f setup.py ]; then {} -m pip install .; \
             else echo 'No pyproject.toml or setup.py found, skipping dependency installation'; fi",
            python
        ));

        for step in steps {
            let mut command = Command::new("bash");
            command.arg("-c").arg(&step).current_dir(&exec_dir);
            let output = run_with_timeout(&mut command, Some(SETUP_TIMEOUT), None)?;
            if !output.success() {
                log::warn!("Environment step failed: {}\n{}", step, output.stderr.trim());
            }
        }
        log::info!("Prepared local environment for {}", repo.label());
        Ok(())
    }
}

fn restore(path: &Path, original: Option<Vec<u8>>) -> Result<()> {
    match original {
        Some(bytes) => fs::write(path, bytes).map_err(|e| Error::io_at(path, e)),
        None => fs::remove_file(path).map_err(|e| Error::io_at(path, e)),
    }
}

impl TestExecutor for LocalVenvExecutor {
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutcome> {
        let exec_dir = self.workspace.exec_dir();
        let target = exec_dir.join(self.workspace.relative(&request.unit.file_path)?);
        let test_path = exec_dir.join(self.workspace.relative(request.test_file)?);

        let exec_root = exec_dir.display().to_string();
        let script = self.invocation.script(
            &exec_root,
            &self.python().display().to_string(),
            &test_path.display().to_string(),
        );
        let argv = vec!["bash".to_string(), "-c".to_string(), script];
        if let Some(reason) = check_command_length(&argv, self.arg_limit) {
            log::warn!("Skipping run of {}: {}", request.unit.name, reason);
            return Ok(ExecutionOutcome::Invalid(reason));
        }

        let original = fs::read(&target).ok();
        let aligned = align(request.candidate, request.context, &self.formatter);
        fs::write(&target, aligned).map_err(|e| Error::io_at(&target, e))?;

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).current_dir(&exec_dir);
        let output = run_with_timeout(&mut command, Some(self.invocation.timeout), None);
        restore(&target, original)?;

        let outcome = interpret_run(self.invocation.runner, request.role, output?);
        log::info!("{} run of {}: {}", role_name(request.role), request.unit.name, outcome.label());
        Ok(outcome)
    }
}
