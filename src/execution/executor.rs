//! Differential test execution inside disposable containers.

use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use super::outcome::{interpret_run, ExecutionOutcome, InvalidReason, RunRole};
use super::runner::TestRunner;
use crate::config::RepoSpec;
use crate::errors::{Error, Result};
use crate::history::WorkspaceHandle;
use crate::python::{align, CodeUnit, Formatter};
use crate::sandbox::{arg_max, command_line_length, container_name, ContainerRuntime, ImageLayout};

/// One test run: `candidate` spliced into `context` (the declaring file)
/// and the test file executed against it.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub unit: &'a CodeUnit,
    /// Test file inside the workspace checkout
    pub test_file: &'a Path,
    pub candidate: &'a str,
    /// Full text of the declaring file the candidate is aligned into
    pub context: &'a str,
    pub role: RunRole,
}

/// Runs a test file against candidate code.
pub trait TestExecutor {
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutcome>;
}

/// How a repository's tests are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInvocation {
    pub runner: TestRunner,
    pub extra_args: String,
    pub timeout: Duration,
}

impl TestInvocation {
    pub fn for_repo(repo: &RepoSpec, timeout: Duration) -> Self {
        Self {
            runner: repo.runner,
            extra_args: repo.extra_test_args.clone(),
            timeout,
        }
    }

    /// Shell script: editable install of the checkout, then the runner.
    pub fn script(&self, checkout: &str, python: &str, test_path: &str) -> String {
        let mut script = format!(
            "export PYTHONPATH=$PYTHONPATH:{checkout} && \
             {python} -m pip install -e . && \
             {python} -m {runner} -v {test_path}",
            checkout = checkout,
            python = python,
            runner = self.runner.module(),
            test_path = test_path,
        );
        if !self.extra_args.is_empty() {
            script.push(' ');
            script.push_str(&self.extra_args);
        }
        script
    }
}

/// Fails with `CommandTooLong` when `argv` would not fit into ARG_MAX.
pub(crate) fn check_command_length(argv: &[String], limit: usize) -> Option<InvalidReason> {
    let length = command_line_length(argv);
    (length > limit).then_some(InvalidReason::CommandTooLong { length, limit })
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Executes each run in a fresh container with the aligned file mounted
/// over its counterpart in the image's checkout.
pub struct SandboxExecutor {
    runtime: Rc<dyn ContainerRuntime>,
    workspace: WorkspaceHandle,
    layout: ImageLayout,
    image: String,
    invocation: TestInvocation,
    formatter: Formatter,
    arg_limit: usize,
}

impl SandboxExecutor {
    pub fn new(
        runtime: Rc<dyn ContainerRuntime>,
        workspace: WorkspaceHandle,
        layout: ImageLayout,
        image: impl Into<String>,
        invocation: TestInvocation,
        formatter: Formatter,
    ) -> Self {
        Self {
            runtime,
            workspace,
            layout,
            image: image.into(),
            invocation,
            formatter,
            arg_limit: arg_max(),
        }
    }

    /// Override the platform ARG_MAX.
    pub fn with_arg_limit(mut self, limit: usize) -> Self {
        self.arg_limit = limit;
        self
    }

    /// Arguments for the runtime's `run`.
    pub fn run_args(&self, container: &str, staged: &Path, unit_path: &Path, test_path: &Path) -> Vec<String> {
        let repo_dir = self.layout.repo_dir();
        let in_container = |relative: &Path| format!("{}/{}", repo_dir, path_str(relative));
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container.to_string(),
            "-v".to_string(),
            format!("{}:{}", path_str(staged), in_container(unit_path)),
            "-w".to_string(),
            repo_dir.clone(),
            self.image.clone(),
            "/bin/bash".to_string(),
            "-c".to_string(),
            self.invocation
                .script(&repo_dir, &self.layout.python(), &in_container(test_path)),
        ]
    }
}

impl TestExecutor for SandboxExecutor {
    fn execute(&mut self, request: &ExecutionRequest<'_>) -> Result<ExecutionOutcome> {
        let unit_path = self.workspace.relative(&request.unit.file_path)?;
        let test_path = self.workspace.relative(request.test_file)?;

        let container = container_name(&self.image, &request.unit.name);
        let stage_root = self.workspace.staging_dir().join(&container);
        let staged = stage_root.join(&unit_path);
        let args = self.run_args(&container, &staged, &unit_path, &test_path);

        let argv: Vec<String> = std::iter::once(self.runtime.program().to_string())
            .chain(args.iter().cloned())
            .collect();
        if let Some(reason) = check_command_length(&argv, self.arg_limit) {
            log::warn!("Skipping run of {}: {}", request.unit.name, reason);
            return Ok(ExecutionOutcome::Invalid(reason));
        }

        let aligned = align(request.candidate, request.context, &self.formatter);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }
        fs::write(&staged, aligned).map_err(|e| Error::io_at(&staged, e))?;

        log::info!(
            "Running {} against {} ({:?}) in {}",
            test_path.display(),
            request.unit.name,
            request.role,
            container
        );
        let output = self.runtime.run(&args, Some(self.invocation.timeout));
        self.runtime.teardown(&container);
        if let Err(e) = fs::remove_dir_all(&stage_root) {
            log::debug!("Leaving staged files in {}: {}", stage_root.display(), e);
        }

        let outcome = interpret_run(self.invocation.runner, request.role, output?);
        log::info!("{} run of {}: {}", role_name(request.role), request.unit.name, outcome.label());
        Ok(outcome)
    }
}

pub(crate) fn role_name(role: RunRole) -> &'static str {
    match role {
        RunRole::Gold => "Gold",
        RunRole::History => "Original",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoIdentity;
    use crate::python::{ContextFile, UnitKind};
    use crate::sandbox::ProcessOutput;
    use indoc::indoc;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
        mounted: RefCell<Option<String>>,
        stdout: String,
        exit_code: i32,
    }

    impl ContainerRuntime for Recorder {
        fn program(&self) -> &str {
            "docker"
        }

        fn run(&self, args: &[String], _timeout: Option<Duration>) -> Result<ProcessOutput> {
            if args[0] == "run" {
                let host = args[5].split(':').next().unwrap_or_default();
                *self.mounted.borrow_mut() = fs::read_to_string(host).ok();
            }
            self.calls.borrow_mut().push(args.to_vec());
            Ok(ProcessOutput {
                exit_code: Some(self.exit_code),
                stdout: self.stdout.clone(),
                ..Default::default()
            })
        }
    }

    const MODULE: &str = indoc! {r#"
        def compute(x):
            return x * 2
    "#};

    fn unit(ws: &WorkspaceHandle) -> CodeUnit {
        let file_path = ws.repo_dir().join("pkg/calc.py");
        CodeUnit::new(
            UnitKind::Function,
            "compute",
            file_path.clone(),
            RepoIdentity {
                id: "1".into(),
                name: "demo".into(),
                url: "https://example.com/demo".into(),
            },
            "def compute(x):\n    return x * 2\n",
            vec![ContextFile {
                name: "calc.py".into(),
                path: file_path,
                code: MODULE.into(),
            }],
        )
        .unwrap()
    }

    fn executor(runtime: Rc<Recorder>, ws: &WorkspaceHandle) -> SandboxExecutor {
        SandboxExecutor::new(
            runtime,
            ws.clone(),
            ImageLayout::new("/workspace"),
            "syncforge/1_demo:3.11",
            TestInvocation {
                runner: TestRunner::Pytest,
                extra_args: "-x".into(),
                timeout: Duration::from_secs(5),
            },
            Formatter::default(),
        )
    }

    #[test]
    fn test_run_mounts_aligned_file_and_tears_down() {
        let temp = TempDir::new().unwrap();
        let ws = WorkspaceHandle::new(temp.path(), temp.path().join("source"));
        let runtime = Rc::new(Recorder {
            stdout: "===== 2 passed in 0.01s =====".into(),
            ..Default::default()
        });
        let unit = unit(&ws);
        let test_file = ws.repo_dir().join("tests/test_calc.py");

        let outcome = executor(runtime.clone(), &ws)
            .execute(&ExecutionRequest {
                unit: &unit,
                test_file: &test_file,
                candidate: "def compute(x):\n    return x + x\n",
                context: MODULE,
                role: RunRole::History,
            })
            .unwrap();

        assert_eq!(outcome.grade(), Some(1));
        let calls = runtime.calls.borrow();
        let verbs: Vec<_> = calls.iter().map(|c| c[0].as_str()).collect();
        assert_eq!(verbs, vec!["run", "stop", "rm"]);
        assert!(calls[0][5].ends_with(":/workspace/test_repo/pkg/calc.py"));
        let script = calls[0].last().unwrap();
        assert!(script.contains("-m pytest -v /workspace/test_repo/tests/test_calc.py -x"));
        assert!(runtime.mounted.borrow().as_deref().unwrap().contains("return x + x"));
        assert!(!ws.staging_dir().join(&calls[0][3]).exists());
    }

    #[test]
    fn test_command_over_arg_max_is_invalid_without_runtime_calls() {
        let temp = TempDir::new().unwrap();
        let ws = WorkspaceHandle::new(temp.path(), temp.path().join("source"));
        let runtime = Rc::new(Recorder::default());
        let unit = unit(&ws);
        let test_file = ws.repo_dir().join("tests/test_calc.py");

        let outcome = executor(runtime.clone(), &ws)
            .with_arg_limit(64)
            .execute(&ExecutionRequest {
                unit: &unit,
                test_file: &test_file,
                candidate: &unit.source,
                context: MODULE,
                role: RunRole::Gold,
            })
            .unwrap();

        assert!(matches!(
            outcome,
            ExecutionOutcome::Invalid(InvalidReason::CommandTooLong { limit: 64, .. })
        ));
        assert!(runtime.calls.borrow().is_empty());
        assert!(!ws.staging_dir().exists());
    }

    #[test]
    fn test_script_shape() {
        let invocation = TestInvocation {
            runner: TestRunner::Unittest,
            extra_args: String::new(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(
            invocation.script("/w/repo", "/w/venv/bin/python", "/w/repo/tests/test_a.py"),
            "export PYTHONPATH=$PYTHONPATH:/w/repo && /w/venv/bin/python -m pip install -e . && \
             /w/venv/bin/python -m unittest -v /w/repo/tests/test_a.py"
        );
    }
}
