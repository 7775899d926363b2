//! Third-party source trees: clone, submodule refresh, patch, requirements.

use crate::command::CommandSpec;
use crate::error::DependencyError;
use crate::runner::{CommandResult, CommandRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A known project with a fixed upstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubProject {
    Pytorch,
    Vision,
    Audio,
}

impl SubProject {
    pub const ALL: [SubProject; 3] = [SubProject::Pytorch, SubProject::Vision, SubProject::Audio];

    /// Directory and CLI name.
    pub fn name(&self) -> &'static str {
        match self {
            SubProject::Pytorch => "pytorch",
            SubProject::Vision => "vision",
            SubProject::Audio => "audio",
        }
    }

    /// Upstream clone URL.
    pub fn clone_url(&self) -> &'static str {
        match self {
            SubProject::Pytorch => "https://github.com/pytorch/pytorch",
            SubProject::Vision => "https://github.com/pytorch/vision",
            SubProject::Audio => "https://github.com/pytorch/audio",
        }
    }

    /// Look up a project by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl std::fmt::Display for SubProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SubProject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(&s.trim().to_lowercase()).ok_or_else(|| {
            format!(
                "unknown project '{}' (expected one of: pytorch, vision, audio)",
                s
            )
        })
    }
}

/// Make `workspace/<project>` ready to build.
///
/// Clones the tree if it is missing, otherwise refreshes its submodules.
/// Applies `<patch_dir>/<project>.patch` if present and installs
/// `requirements.txt` with `<python> -m pip` if present. Returns the tree.
pub async fn prepare_source(
    workspace: &Path,
    project: SubProject,
    python: &str,
    patch_dir: Option<&Path>,
    env: Option<&BTreeMap<String, String>>,
) -> Result<PathBuf, DependencyError> {
    let tree = workspace.join(project.name());

    if tree.is_dir() {
        info!(project = %project, "Updating submodules in {:?}", tree);
        run_checked(&CommandSpec::submodule_sync(), &tree, None).await?;
        run_checked(&CommandSpec::submodule_update(), &tree, None).await?;
    } else {
        info!(project = %project, "Cloning {}", project.clone_url());
        run_checked(&CommandSpec::git_clone(project.clone_url(), &tree), workspace, None).await?;
    }

    if let Some(patch) = patch_dir.map(|d| d.join(format!("{}.patch", project.name()))) {
        if patch.is_file() {
            info!(project = %project, "Applying {:?}", patch);
            run_checked(&CommandSpec::git_apply(&patch), &tree, None).await?;
        } else {
            warn!(project = %project, "No patch at {:?}, skipping", patch);
        }
    }

    let requirements = tree.join("requirements.txt");
    if requirements.is_file() {
        info!(project = %project, "Installing requirements");
        run_checked(
            &CommandSpec::pip_install_requirements(python, &requirements),
            &tree,
            env,
        )
        .await?;
    }

    Ok(tree)
}

/// Run a helper command, turning a non-zero exit into an error.
async fn run_checked(
    spec: &CommandSpec,
    working_dir: &Path,
    env: Option<&BTreeMap<String, String>>,
) -> Result<CommandResult, DependencyError> {
    let result = CommandRunner::execute(spec, working_dir, env).await?;
    if !result.passed() {
        return Err(DependencyError::CommandFailed {
            tool: spec.program.clone(),
            code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        });
    }
    Ok(result)
}
