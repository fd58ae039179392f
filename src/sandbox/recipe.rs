//! Dockerfile generation for a repository's test environment.

use crate::config::{RepoSpec, SandboxConfig};

/// Paths inside the image shared by the recipe and the executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayout {
    pub workdir: String,
}

impl ImageLayout {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.workdir.clone())
    }

    pub fn venv_dir(&self) -> String {
        format!("{}/test_venv", self.workdir)
    }

    pub fn venv_bin(&self) -> String {
        format!("{}/bin", self.venv_dir())
    }

    pub fn python(&self) -> String {
        format!("{}/python", self.venv_bin())
    }

    /// Where the repository is cloned inside the image.
    pub fn repo_dir(&self) -> String {
        format!("{}/test_repo", self.workdir)
    }
}

/// Image name and tag derived from the registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn for_repo(namespace: &str, repo: &RepoSpec) -> Self {
        Self {
            name: format!(
                "{}/{}_{}",
                namespace,
                repo.identity.id,
                repo.identity.name.to_lowercase()
            ),
            tag: repo.python_version.clone(),
        }
    }

    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

fn has_version_operator(requirement: &str) -> bool {
    requirement.contains(['=', '<', '>', '!', '~'])
}

/// Render the Dockerfile for `repo`.
///
/// Order: interpreter and venv, OS build tools, clone, project install
/// (poetry, plain pip, or nothing), then pinned requirements or, only when
/// there are none, the custom install commands.
pub fn render_dockerfile(repo: &RepoSpec, layout: &ImageLayout) -> String {
    let bin = layout.venv_bin();
    let repo_dir = layout.repo_dir();

    let mut lines = vec![
        format!("FROM python:{}", repo.python_version),
        format!("WORKDIR {}", layout.workdir),
        format!("RUN python -m venv {}", layout.venv_dir()),
        "RUN apt-get update && apt-get install -y git curl".to_string(),
        "RUN apt-get update && apt-get install -y ninja-build".to_string(),
        format!("RUN {}/pip install --upgrade pip", bin),
        format!("RUN git clone {} {}", repo.identity.url, repo_dir),
        format!("WORKDIR {}", repo_dir),
        format!("RUN {}/pip install poetry", bin),
        format!("RUN {}/pip install flit", bin),
        format!("RUN {}/pip install --upgrade setuptools", bin),
        format!("RUN {}/pip install -U {}", bin, repo.runner.packages().join(" ")),
        format!(
            "RUN if [ -f pyproject.toml ]; then \
             . {bin}/activate && \
             curl -sSL https://install.python-poetry.org | python3 - && \
             export PATH=$PATH:/root/.local/bin && \
             grep -q '[tool.poetry]' pyproject.toml && /root/.local/bin/poetry install || \
             . {bin}/activate && pip install .; \
             elif [ -f setup.py ]; then \
             . {bin}/activate && pip install .; \
             else \
             echo 'No pyproject.toml or setup.py found, skipping dependency installation'; \
             fi",
            bin = bin
        ),
    ];

    if !repo.requirements.is_empty() {
        if !repo.install_commands.is_empty() {
            log::info!(
                "{} declares both requirements and install commands; using requirements",
                repo.label()
            );
        }
        lines.extend(repo.requirements.iter().map(|requirement| {
            if has_version_operator(requirement) {
                format!("RUN {}/pip install '{}'", bin, requirement.replace(' ', ""))
            } else {
                format!("RUN {}/pip install {}", bin, requirement)
            }
        }));
    } else {
        lines.extend(
            repo.install_commands
                .iter()
                .map(|command| format!("RUN {}/{}", bin, command)),
        );
    }

    let mut dockerfile = lines.join("\n");
    dockerfile.push('\n');
    dockerfile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_registry;

    fn repo(extra: &str) -> RepoSpec {
        let json = format!(
            r#"[{{"repo_id": 4, "repo_name": "Demo", "github_link": "https://github.com/a/Demo"{}}}]"#,
            extra
        );
        parse_registry(&json).unwrap().remove(0)
    }

    #[test]
    fn test_image_ref() {
        let image = ImageRef::for_repo("syncforge", &repo(""));
        assert_eq!(image.reference(), "syncforge/4_demo:3.11");
    }

    #[test]
    fn test_layout_paths() {
        let layout = ImageLayout::new("/workspace/");
        assert_eq!(layout.python(), "/workspace/test_venv/bin/python");
        assert_eq!(layout.repo_dir(), "/workspace/test_repo");
    }

    #[test]
    fn test_recipe_order() {
        let dockerfile = render_dockerfile(&repo(""), &ImageLayout::new("/workspace"));
        let lines: Vec<_> = dockerfile.lines().collect();
        assert_eq!(lines[0], "FROM python:3.11");
        let venv = lines.iter().position(|l| l.contains("-m venv")).unwrap();
        let apt = lines.iter().position(|l| l.contains("apt-get")).unwrap();
        let clone = lines.iter().position(|l| l.contains("git clone")).unwrap();
        let project = lines.iter().position(|l| l.contains("pyproject.toml")).unwrap();
        assert!(venv < apt && apt < clone && clone < project);
        assert!(dockerfile.contains("pip install -U pytest"));
    }

    #[test]
    fn test_requirements_take_precedence() {
        let dockerfile = render_dockerfile(
            &repo(r#", "requirements": ["numpy >= 1.2", "six"], "install_command": ["pip install -e ."]"#),
            &ImageLayout::new("/workspace"),
        );
        assert!(dockerfile.contains("RUN /workspace/test_venv/bin/pip install 'numpy>=1.2'"));
        assert!(dockerfile.contains("RUN /workspace/test_venv/bin/pip install six"));
        assert!(!dockerfile.contains("pip install -e ."));
    }

    #[test]
    fn test_install_commands_used_without_requirements() {
        let dockerfile = render_dockerfile(
            &repo(r#", "install_command": ["pip install -r requirements-dev.txt"]"#),
            &ImageLayout::new("/workspace"),
        );
        assert!(dockerfile
            .ends_with("RUN /workspace/test_venv/bin/pip install -r requirements-dev.txt\n"));
    }
}
