//! Image lookup, build, and checkout materialization.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use super::cleanup::{remove_dir_robust, retrying};
use super::recipe::{render_dockerfile, ImageLayout, ImageRef};
use super::runtime::{container_name, ContainerRuntime};
use crate::config::{RepoSpec, RetryConfig, SandboxConfig};
use crate::errors::{Error, Result};
use crate::history::WorkspaceHandle;
use crate::observability::{set_phase, MiningPhase};

/// An image ready to run tests for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedImage {
    /// Reference passed to `run`
    pub reference: String,
    /// `None` when the registry supplied a prebuilt image
    pub built: Option<ImageRef>,
}

impl ProvisionedImage {
    pub fn is_prebuilt(&self) -> bool {
        self.built.is_none()
    }
}

/// Re-creates a workspace checkout after it became unusable.
pub trait CheckoutRefresher {
    fn refresh(&self, workspace: &WorkspaceHandle) -> Result<()>;
}

/// Provisions images and checkouts through a container runtime.
pub struct Provisioner {
    runtime: Rc<dyn ContainerRuntime>,
    layout: ImageLayout,
    namespace: String,
    publish_namespace: Option<String>,
    retry: RetryConfig,
}

impl Provisioner {
    pub fn new(runtime: Rc<dyn ContainerRuntime>, config: &SandboxConfig, retry: RetryConfig) -> Self {
        Self {
            runtime,
            layout: ImageLayout::from_config(config),
            namespace: config.image_namespace.clone(),
            publish_namespace: config.publish_namespace.clone(),
            retry,
        }
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn runtime(&self) -> Rc<dyn ContainerRuntime> {
        Rc::clone(&self.runtime)
    }

    /// Find or build the image for `repo`.
    ///
    /// A prebuilt image from the registry is pulled when it is not present
    /// locally. Otherwise the derived image is looked up and, when absent,
    /// built from a generated Dockerfile in the workspace build directory.
    pub fn ensure_image(&self, repo: &RepoSpec, workspace: &WorkspaceHandle) -> Result<ProvisionedImage> {
        let _phase = set_phase(MiningPhase::Provisioning);

        if let Some(prebuilt) = &repo.image_id {
            if self.runtime.image_id(prebuilt)?.is_none() {
                log::info!("Pulling prebuilt image {}", prebuilt);
                self.runtime.pull_image(prebuilt)?;
            }
            return Ok(ProvisionedImage {
                reference: prebuilt.clone(),
                built: None,
            });
        }

        let image = ImageRef::for_repo(&self.namespace, repo);
        let reference = image.reference();
        if self.runtime.image_id(&reference)?.is_some() {
            log::info!("Reusing image {}", reference);
            return Ok(ProvisionedImage {
                reference,
                built: Some(image),
            });
        }

        let build_dir = workspace.build_dir();
        fs::create_dir_all(&build_dir).map_err(|e| Error::io_at(&build_dir, e))?;
        let dockerfile = build_dir.join("Dockerfile");
        fs::write(&dockerfile, render_dockerfile(repo, &self.layout))
            .map_err(|e| Error::io_at(&dockerfile, e))?;

        log::info!("Building image {} for {}", reference, repo.label());
        self.runtime.build_image(&reference, &dockerfile, &build_dir)?;

        if self.runtime.image_id(&reference)?.is_none() {
            return Err(Error::ImageUnavailable(reference));
        }
        Ok(ProvisionedImage {
            reference,
            built: Some(image),
        })
    }

    /// Copy the repository out of `image` into `dest`.
    ///
    /// An existing `dest` is kept unless `force_remove` is set. Container
    /// start and copy are retried, and the container is always torn down.
    pub fn materialize_checkout(&self, image: &str, dest: &Path, force_remove: bool) -> Result<()> {
        let _phase = set_phase(MiningPhase::Provisioning);

        if dest.exists() {
            if !force_remove {
                log::debug!("Checkout {} already present", dest.display());
                return Ok(());
            }
            remove_dir_robust(dest, &self.retry)?;
        }

        let repo_dir = self.layout.repo_dir();
        retrying(&self.retry, &format!("materialize {}", dest.display()), |_| {
            fs::create_dir_all(dest).map_err(|e| Error::io_at(dest, e))?;
            let container = container_name(image, "checkout");
            self.runtime.start_detached(&container, image)?;

            let copied = self
                .runtime
                .copy_from(&container, &format!("{}/.", repo_dir), dest)
                .and_then(|()| {
                    if !dest.join(".git").exists() {
                        let git_dir = format!("{}/.git", repo_dir);
                        if let Err(e) = self.runtime.copy_from(&container, &git_dir, &dest.join(".git")) {
                            log::warn!("No VCS metadata copied from {}: {}", image, e);
                        }
                    }
                    Ok(())
                });
            self.runtime.teardown(&container);
            copied?;

            if has_entries(dest) {
                Ok(())
            } else {
                let _ = fs::remove_dir(dest);
                Err(Error::workspace(dest, "checkout was not copied"))
            }
        })?;

        log::info!("Materialized checkout of {} at {}", image, dest.display());
        Ok(())
    }

    /// Tag and push a built image under the configured user namespace.
    pub fn publish_image(&self, image: &ProvisionedImage) -> Result<Option<String>> {
        let (Some(user), Some(built)) = (&self.publish_namespace, &image.built) else {
            return Ok(None);
        };
        let short_name = built.name.rsplit('/').next().unwrap_or(&built.name);
        let target = format!("{}/{}:{}", user, short_name, built.tag);
        self.runtime.tag_image(&image.reference, &target)?;
        self.runtime.push_image(&target)?;
        log::info!("Published {} as {}", image.reference, target);
        Ok(Some(target))
    }

    /// Remove a locally built image.
    pub fn remove_image(&self, image: &ProvisionedImage) -> Result<()> {
        let _phase = set_phase(MiningPhase::Cleanup);
        match self.runtime.image_id(&image.reference)? {
            Some(id) => {
                self.runtime.remove_image(&id)?;
                log::info!("Removed image {} ({})", image.reference, id);
            }
            None => log::debug!("Image {} already gone", image.reference),
        }
        Ok(())
    }

    /// A refresher that re-copies the checkout from `image`.
    pub fn refresher<'a>(&'a self, image: &'a ProvisionedImage) -> ImageCheckout<'a> {
        ImageCheckout {
            provisioner: self,
            image,
        }
    }
}

/// Restores a workspace checkout from the repository's image.
pub struct ImageCheckout<'a> {
    provisioner: &'a Provisioner,
    image: &'a ProvisionedImage,
}

impl CheckoutRefresher for ImageCheckout<'_> {
    fn refresh(&self, workspace: &WorkspaceHandle) -> Result<()> {
        log::warn!("Re-provisioning checkout at {}", workspace.repo_dir().display());
        self.provisioner
            .materialize_checkout(&self.image.reference, workspace.repo_dir(), true)
    }
}

/// Restores a workspace checkout by cloning the repository URL.
pub struct CloneCheckout {
    url: String,
    retry: RetryConfig,
}

impl CloneCheckout {
    pub fn new(url: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            url: url.into(),
            retry,
        }
    }

    /// Clone into `dest` unless a checkout is already there.
    pub fn ensure(&self, dest: &Path, force_remove: bool) -> Result<()> {
        if dest.join(".git").exists() && !force_remove {
            return Ok(());
        }
        remove_dir_robust(dest, &self.retry)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }
        retrying(&self.retry, &format!("clone {}", self.url), |_| {
            remove_dir_robust(dest, &self.retry)?;
            git2::Repository::clone(&self.url, dest)?;
            Ok(())
        })?;
        log::info!("Cloned {} into {}", self.url, dest.display());
        Ok(())
    }
}

impl CheckoutRefresher for CloneCheckout {
    fn refresh(&self, workspace: &WorkspaceHandle) -> Result<()> {
        log::warn!("Re-cloning checkout at {}", workspace.repo_dir().display());
        self.ensure(workspace.repo_dir(), true)
    }
}

/// True when `dir` exists and holds at least one entry.
fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_registry;
    use crate::sandbox::ProcessOutput;
    use std::cell::RefCell;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Answers `images -q` from a set of known images and records calls.
    #[derive(Default)]
    struct FakeRuntime {
        images: RefCell<Vec<String>>,
        calls: RefCell<Vec<Vec<String>>>,
        build_adds_image: bool,
        copy_is_empty: bool,
    }

    impl ContainerRuntime for FakeRuntime {
        fn program(&self) -> &str {
            "docker"
        }

        fn run(&self, args: &[String], _timeout: Option<Duration>) -> Result<ProcessOutput> {
            self.calls.borrow_mut().push(args.to_vec());
            let mut stdout = String::new();
            match args[0].as_str() {
                "images" if self.images.borrow().contains(&args[2]) => stdout = "id42\n".into(),
                "build" if self.build_adds_image => self.images.borrow_mut().push(args[2].clone()),
                "cp" if !self.copy_is_empty => {
                    let dest = Path::new(&args[2]);
                    fs::create_dir_all(dest.join(".git")).unwrap();
                }
                _ => {}
            }
            Ok(ProcessOutput {
                exit_code: Some(0),
                stdout,
                ..Default::default()
            })
        }
    }

    fn repo(extra: &str) -> RepoSpec {
        let json = format!(
            r#"[{{"repo_id": 3, "repo_name": "Demo", "github_link": "https://github.com/a/Demo"{}}}]"#,
            extra
        );
        parse_registry(&json).unwrap().remove(0)
    }

    fn provisioner(runtime: Rc<FakeRuntime>) -> Provisioner {
        Provisioner::new(runtime, &SandboxConfig::default(), RetryConfig::immediate(2))
    }

    fn verbs(runtime: &FakeRuntime) -> Vec<String> {
        runtime.calls.borrow().iter().map(|c| c[0].clone()).collect()
    }

    #[test]
    fn test_existing_image_is_reused_without_build() {
        let temp = TempDir::new().unwrap();
        let runtime = Rc::new(FakeRuntime::default());
        runtime.images.borrow_mut().push("syncforge/3_demo:3.11".into());
        let ws = WorkspaceHandle::new(temp.path(), temp.path().join("source"));

        let image = provisioner(runtime.clone()).ensure_image(&repo(""), &ws).unwrap();
        assert_eq!(image.reference, "syncforge/3_demo:3.11");
        assert_eq!(verbs(&runtime), vec!["images"]);
    }

    #[test]
    fn test_missing_image_is_built_from_generated_dockerfile() {
        let temp = TempDir::new().unwrap();
        let runtime = Rc::new(FakeRuntime {
            build_adds_image: true,
            ..Default::default()
        });
        let ws = WorkspaceHandle::new(temp.path(), temp.path().join("source"));

        let image = provisioner(runtime.clone()).ensure_image(&repo(""), &ws).unwrap();
        assert!(!image.is_prebuilt());
        assert_eq!(verbs(&runtime), vec!["images", "build", "images"]);
        let dockerfile = fs::read_to_string(ws.build_dir().join("Dockerfile")).unwrap();
        assert!(dockerfile.starts_with("FROM python:3.11"));
    }

    #[test]
    fn test_failed_build_is_image_unavailable() {
        let temp = TempDir::new().unwrap();
        let runtime = Rc::new(FakeRuntime::default());
        let ws = WorkspaceHandle::new(temp.path(), temp.path().join("source"));

        let err = provisioner(runtime).ensure_image(&repo(""), &ws).unwrap_err();
        assert!(matches!(err, Error::ImageUnavailable(_)));
    }

    #[test]
    fn test_prebuilt_image_is_pulled_when_absent() {
        let temp = TempDir::new().unwrap();
        let runtime = Rc::new(FakeRuntime::default());
        let ws = WorkspaceHandle::new(temp.path(), temp.path().join("source"));

        let image = provisioner(runtime.clone())
            .ensure_image(&repo(r#", "image_id": "hub/prebuilt:1""#), &ws)
            .unwrap();
        assert!(image.is_prebuilt());
        assert_eq!(verbs(&runtime), vec!["images", "pull"]);
    }

    #[test]
    fn test_materialize_copies_then_tears_down() {
        let temp = TempDir::new().unwrap();
        let runtime = Rc::new(FakeRuntime::default());
        let dest = temp.path().join("source");

        provisioner(runtime.clone())
            .materialize_checkout("syncforge/3_demo:3.11", &dest, false)
            .unwrap();
        assert!(dest.join(".git").exists());
        assert_eq!(verbs(&runtime), vec!["run", "cp", "stop", "rm"]);

        // Present and not forced: nothing to do
        runtime.calls.borrow_mut().clear();
        provisioner(runtime.clone())
            .materialize_checkout("syncforge/3_demo:3.11", &dest, false)
            .unwrap();
        assert!(runtime.calls.borrow().is_empty());
    }

    #[test]
    fn test_empty_copy_is_retried_then_rejected() {
        let temp = TempDir::new().unwrap();
        let runtime = Rc::new(FakeRuntime {
            copy_is_empty: true,
            ..Default::default()
        });
        let dest = temp.path().join("source");

        let err = provisioner(runtime.clone())
            .materialize_checkout("syncforge/3_demo:3.11", &dest, false)
            .unwrap_err();
        assert!(err.is_workspace_invalid());
        assert!(!dest.exists());
        let runs = verbs(&runtime).iter().filter(|v| *v == "run").count();
        assert_eq!(runs, 2);
    }

    #[test]
    fn test_publish_requires_namespace_and_built_image() {
        let runtime = Rc::new(FakeRuntime::default());
        let config = SandboxConfig {
            publish_namespace: Some("alice".into()),
            ..Default::default()
        };
        let provisioner = Provisioner::new(runtime.clone(), &config, RetryConfig::immediate(1));
        let image = ProvisionedImage {
            reference: "syncforge/3_demo:3.11".into(),
            built: Some(ImageRef {
                name: "syncforge/3_demo".into(),
                tag: "3.11".into(),
            }),
        };

        let target = provisioner.publish_image(&image).unwrap();
        assert_eq!(target.as_deref(), Some("alice/3_demo:3.11"));
        assert_eq!(verbs(&runtime), vec!["tag", "push"]);

        let prebuilt = ProvisionedImage {
            reference: "hub/x:1".into(),
            built: None,
        };
        assert_eq!(provisioner.publish_image(&prebuilt).unwrap(), None);
    }
}
