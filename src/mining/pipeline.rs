//! End-to-end mining of one repository.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::rc::Rc;

use super::construct_log::ConstructLog;
use super::discovery::TargetDiscovery;
use super::miner::Miner;
use super::store::InstanceStore;
use crate::config::{ExecutionMethod, RepoSpec, SyncforgeConfig};
use crate::errors::Result;
use crate::execution::{LocalVenvExecutor, SandboxExecutor, TestExecutor, TestInvocation};
use crate::history::{CommitHistoryTracer, WorkspaceHandle};
use crate::observability::{increment_processed, set_phase, set_progress, set_repository, MiningPhase};
use crate::python::{Formatter, UnitExtractor};
use crate::sandbox::{
    remove_dir_robust, CheckoutRefresher, CloneCheckout, ContainerRuntime, DockerCli, Provisioner,
};

/// Totals for one mined repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningSummary {
    pub repository: String,
    pub targets: usize,
    pub abandoned_targets: usize,
    /// Instances accepted during this run
    pub accepted: usize,
    /// Instances in the dataset afterwards, including resumed ones
    pub total_instances: usize,
    pub dataset_path: PathBuf,
}

fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(label.to_string());
    bar
}

struct Collaborators<'a> {
    workspace: &'a WorkspaceHandle,
    config: &'a SyncforgeConfig,
    repo: &'a RepoSpec,
    formatter: Formatter,
}

impl Collaborators<'_> {
    /// Discover targets and run the miner over them.
    fn mine(
        &self,
        executor: &mut dyn TestExecutor,
        refresher: &dyn CheckoutRefresher,
    ) -> Result<MiningSummary> {
        let mining = &self.config.mining;
        let extractor = UnitExtractor::new(
            self.workspace.repo_dir(),
            self.repo.identity.clone(),
            self.formatter.clone(),
        )
        .strict(mining.strict_unit_filter);
        let targets = TargetDiscovery::new(&extractor, &mining.exclude, mining.max_extracted_targets)?
            .skip_test_modules(mining.dataset == "callee")
            .load_or_discover(&self.workspace.targets_cache_path())?;

        let store = InstanceStore::load(self.workspace.dataset_path())?;
        let resumed = store.len();
        let mut tracer = CommitHistoryTracer::new(
            self.workspace.clone(),
            self.formatter.clone(),
            mining.commit_trace,
        );
        let mut miner = Miner::new(self.workspace, &mut tracer, executor, refresher, store)
            .with_mode(mining.unittest_mode)
            .with_dataset(mining.dataset.clone())
            .with_formatter(self.formatter.clone())
            .with_construct_log(ConstructLog::load(self.workspace.construct_log_path())?);

        set_progress(0, targets.len());
        let bar = progress_bar(targets.len(), &self.repo.label());
        let mut abandoned_targets = 0;
        for target in &targets {
            let report = miner.mine_target(target)?;
            if report.aborted.is_some() {
                abandoned_targets += 1;
            }
            increment_processed();
            bar.inc(1);
        }
        bar.finish_and_clear();

        let store = miner.into_store();
        Ok(MiningSummary {
            repository: self.repo.label(),
            targets: targets.len(),
            abandoned_targets,
            accepted: store.len() - resumed,
            total_instances: store.len(),
            dataset_path: store.path().to_path_buf(),
        })
    }
}

/// Mine `repo` with the given configuration.
///
/// The checkout and environment are provisioned first, then every test
/// target is mined. Temporary checkouts are removed at the end; a built
/// image is removed unless it was prebuilt or `keep_image` is set.
pub fn mine_repository(repo: &RepoSpec, config: &SyncforgeConfig) -> Result<MiningSummary> {
    let _repository = set_repository(repo.label());
    let workspace =
        WorkspaceHandle::for_repo(&config.paths.work_root, &config.mining.dataset, repo);
    let collaborators = Collaborators {
        workspace: &workspace,
        config,
        repo,
        formatter: Formatter::from_config(&config.formatter),
    };
    let invocation = TestInvocation::for_repo(repo, config.mining.timeout());
    log::info!("Mining {} into {}", repo.label(), workspace.root().display());

    let summary = match config.mining.execution {
        ExecutionMethod::Sandbox => {
            let runtime: Rc<dyn ContainerRuntime> =
                Rc::new(DockerCli::detect(&config.sandbox.runtime)?);
            let provisioner = Provisioner::new(runtime, &config.sandbox, config.retry.clone());
            let image = provisioner.ensure_image(repo, &workspace)?;
            provisioner.materialize_checkout(&image.reference, workspace.repo_dir(), false)?;

            let mut executor = SandboxExecutor::new(
                provisioner.runtime(),
                workspace.clone(),
                provisioner.layout().clone(),
                image.reference.clone(),
                invocation,
                collaborators.formatter.clone(),
            );
            let summary = collaborators.mine(&mut executor, &provisioner.refresher(&image));

            let _phase = set_phase(MiningPhase::Cleanup);
            if let Err(e) = provisioner.publish_image(&image) {
                log::warn!("Failed to publish {}: {}", image.reference, e);
            }
            if !image.is_prebuilt() && !config.sandbox.keep_image {
                if let Err(e) = provisioner.remove_image(&image) {
                    log::warn!("Failed to remove {}: {}", image.reference, e);
                }
            }
            summary
        }
        ExecutionMethod::LocalVenv => {
            let checkout = CloneCheckout::new(repo.identity.url.clone(), config.retry.clone());
            checkout.ensure(workspace.repo_dir(), false)?;
            let mut executor =
                LocalVenvExecutor::new(workspace.clone(), invocation, collaborators.formatter.clone());
            executor.prepare(repo, &config.retry)?;
            collaborators.mine(&mut executor, &checkout)
        }
    };

    let _phase = set_phase(MiningPhase::Cleanup);
    for dir in [workspace.repo_dir().to_path_buf(), workspace.exec_dir(), workspace.staging_dir()] {
        if let Err(e) = remove_dir_robust(&dir, &config.retry) {
            log::warn!("{}", e);
        }
    }

    let summary = summary?;
    log::info!(
        "{}: {} new instance(s), {} in total",
        summary.repository,
        summary.accepted,
        summary.total_instances
    );
    Ok(summary)
}
