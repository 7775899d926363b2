//! Build pipeline orchestration.
//!
//! One invocation walks `Idle → Resolving → EnvironmentReady → Building →
//! {Succeeded, Failed}`. The first error is terminal; nothing is retried.

use crate::artifact::ArtifactQuery;
use crate::command::CommandSpec;
use crate::error::{BuildError, PipelineError};
use crate::events::{BuildEvent, BuildEventSink, BuildPhase};
use crate::runner::invoke_build;
use crate::sources::{prepare_source, SubProject};
use chrono::{DateTime, Utc};
use hipwheel_toolkit::{
    synthesize_environment, BuildEnvironment, DefineTable, DiagnosticTool, ToolchainInfo,
    ToolkitResolver,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything a build invocation needs besides the resolver.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Source tree, or the workspace holding `projects`.
    pub source_dir: PathBuf,

    /// Python interpreter used for pip and the default build command.
    pub python: String,

    /// GPU target, e.g. `gfx1102`.
    pub target_arch: String,

    /// Projects to prepare and build in order; empty builds `source_dir`.
    pub projects: Vec<SubProject>,

    /// Directory holding `<project>.patch` files.
    pub patch_dir: Option<PathBuf>,

    /// Version-derived defines.
    pub defines: DefineTable,

    /// Where to look for the produced artifact.
    pub artifacts: ArtifactQuery,

    /// Build command override; `<python> setup.py bdist_wheel` otherwise.
    pub build_command: Option<CommandSpec>,

    /// Inherited environment.
    pub base_env: BTreeMap<String, String>,
}

impl BuildRequest {
    /// Create a request that inherits the current process environment.
    pub fn new(source_dir: impl Into<PathBuf>, python: &str, target_arch: &str) -> Self {
        Self {
            source_dir: source_dir.into(),
            python: python.to_string(),
            target_arch: target_arch.to_string(),
            projects: Vec::new(),
            patch_dir: None,
            defines: DefineTable::empty(),
            artifacts: ArtifactQuery::default(),
            build_command: None,
            base_env: BuildEnvironment::capture_base(),
        }
    }

    pub fn with_projects(mut self, projects: Vec<SubProject>) -> Self {
        self.projects = projects;
        self
    }

    pub fn with_patch_dir(mut self, patch_dir: impl Into<PathBuf>) -> Self {
        self.patch_dir = Some(patch_dir.into());
        self
    }

    pub fn with_defines(mut self, defines: DefineTable) -> Self {
        self.defines = defines;
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactQuery) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_build_command(mut self, command: CommandSpec) -> Self {
        self.build_command = Some(command);
        self
    }

    pub fn with_base_env(mut self, base_env: BTreeMap<String, String>) -> Self {
        self.base_env = base_env;
        self
    }

    fn command(&self) -> CommandSpec {
        self.build_command
            .clone()
            .unwrap_or_else(|| CommandSpec::bdist_wheel(&self.python))
    }
}

/// An artifact and the project it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuiltArtifact {
    /// `None` when `source_dir` was built directly.
    pub project: Option<SubProject>,
    pub path: PathBuf,
}

/// Summary of a successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub run_id: String,
    pub toolchain: ToolchainInfo,
    pub target_arch: String,
    pub env_fingerprint: String,
    pub artifacts: Vec<BuiltArtifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    /// The artifact of the last project built.
    pub fn last_artifact(&self) -> Option<&Path> {
        self.artifacts.last().map(|a| a.path.as_path())
    }
}

/// Build pipeline orchestrator.
pub struct BuildPipeline {
    sink: Arc<dyn BuildEventSink>,
    phase: BuildPhase,
}

impl BuildPipeline {
    pub fn new(sink: Arc<dyn BuildEventSink>) -> Self {
        Self {
            sink,
            phase: BuildPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Resolve the toolkit, synthesise the environment and build every tree.
    ///
    /// Ends in `Succeeded` or `Failed`; failures are recorded in the sink
    /// before being returned.
    pub async fn run<D: DiagnosticTool>(
        &mut self,
        request: &BuildRequest,
        resolver: &ToolkitResolver<D>,
    ) -> Result<BuildReport, PipelineError> {
        match self.execute(request, resolver).await {
            Ok(report) => {
                self.advance(BuildPhase::Succeeded);
                info!(run_id = %report.run_id, "Wheel build succeeded");
                Ok(report)
            }
            Err(e) => {
                self.sink.record(&BuildEvent::Failed {
                    message: e.to_string(),
                });
                self.advance(BuildPhase::Failed);
                Err(e)
            }
        }
    }

    async fn execute<D: DiagnosticTool>(
        &mut self,
        request: &BuildRequest,
        resolver: &ToolkitResolver<D>,
    ) -> Result<BuildReport, PipelineError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, source = ?request.source_dir, "Starting wheel build");

        if !request.source_dir.is_dir() {
            return Err(BuildError::SourceMissing(request.source_dir.clone()).into());
        }

        self.advance(BuildPhase::Resolving);
        let toolchain = resolver.resolve()?;
        self.sink.record(&BuildEvent::ToolkitResolved {
            path: toolchain.install_path.clone(),
            version: toolchain.version.to_string(),
            source: format!("{:?}", toolchain.source),
        });

        let env = synthesize_environment(
            &toolchain,
            &request.target_arch,
            &request.base_env,
            &request.defines,
        )?;
        debug!(flags = %env.compiler_flags_blob(), "Compiler flags");
        debug!(cmake_args = %env.cmake_args_blob(), "CMake arguments");
        self.sink.record(&BuildEvent::EnvironmentReady {
            fingerprint: env.short_fingerprint(),
            variables: env.vars().len(),
        });
        self.advance(BuildPhase::EnvironmentReady);

        let command = request.command();
        let mut artifacts = Vec::new();

        if request.projects.is_empty() {
            self.advance(BuildPhase::Building);
            let outcome = invoke_build(
                &request.source_dir,
                &command,
                &env,
                &request.artifacts,
                self.sink.as_ref(),
            )
            .await?;
            artifacts.push(BuiltArtifact {
                project: None,
                path: outcome.artifact,
            });
        }

        for project in &request.projects {
            self.advance(BuildPhase::Building);
            let tree = prepare_source(
                &request.source_dir,
                *project,
                &request.python,
                request.patch_dir.as_deref(),
                Some(env.vars()),
            )
            .await?;
            let outcome = invoke_build(
                &tree,
                &command,
                &env,
                &request.artifacts,
                self.sink.as_ref(),
            )
            .await?;
            artifacts.push(BuiltArtifact {
                project: Some(*project),
                path: outcome.artifact,
            });
        }

        Ok(BuildReport {
            run_id,
            toolchain,
            target_arch: request.target_arch.clone(),
            env_fingerprint: env.fingerprint(),
            artifacts,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn advance(&mut self, next: BuildPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
        self.sink.record(&BuildEvent::PhaseChanged { phase: next });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hipwheel_toolkit::{ToolkitVersion, VersionSource};

    fn report(artifacts: Vec<BuiltArtifact>) -> BuildReport {
        BuildReport {
            run_id: "run123".to_string(),
            toolchain: ToolchainInfo {
                install_path: PathBuf::from("/opt/rocm"),
                version: ToolkitVersion::new(6, 3, 1),
                source: VersionSource::Symlink,
            },
            target_arch: "gfx1102".to_string(),
            env_fingerprint: "abc123".to_string(),
            artifacts,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = BuildRequest::new("/src/pytorch", "python3.11", "gfx1102");
        assert!(request.projects.is_empty());
        assert!(request.defines.is_empty());
        assert_eq!(request.artifacts, ArtifactQuery::default());
        assert_eq!(
            request.command().command_line(),
            "python3.11 setup.py bdist_wheel"
        );
    }

    #[test]
    fn test_request_command_override() {
        let request = BuildRequest::new("/src", "python3", "gfx90a").with_build_command(
            CommandSpec::custom("make", vec!["make".to_string(), "wheel".to_string()]),
        );
        assert_eq!(request.command().command_line(), "make wheel");
    }

    #[test]
    fn test_report_last_artifact() {
        let report = report(vec![
            BuiltArtifact {
                project: Some(SubProject::Pytorch),
                path: PathBuf::from("/w/pytorch/dist/torch.whl"),
            },
            BuiltArtifact {
                project: Some(SubProject::Vision),
                path: PathBuf::from("/w/vision/dist/torchvision.whl"),
            },
        ]);
        assert_eq!(
            report.last_artifact(),
            Some(Path::new("/w/vision/dist/torchvision.whl"))
        );
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(report(vec![])).unwrap();
        assert_eq!(json["toolchain"]["version"]["major"], 6);
        assert_eq!(json["toolchain"]["source"], "symlink");
        assert_eq!(json["target_arch"], "gfx1102");
    }

    #[test]
    fn test_new_pipeline_is_idle() {
        let pipeline = BuildPipeline::new(Arc::new(crate::events::MemorySink::new()));
        assert_eq!(pipeline.phase(), BuildPhase::Idle);
    }
}
