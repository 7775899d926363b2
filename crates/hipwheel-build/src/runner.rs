//! External command execution and wheel builds.

use crate::artifact::ArtifactQuery;
use crate::command::{CommandSpec, OutputMode};
use crate::error::{BuildError, DependencyError, Result};
use crate::events::{BuildEvent, BuildEventSink};
use hipwheel_toolkit::BuildEnvironment;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Command name.
    pub name: String,

    /// Exit code (0 = success, -1 = killed by a signal).
    pub exit_code: i32,

    /// Captured stdout (empty when inherited).
    pub stdout: String,

    /// Captured stderr (empty when inherited).
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl CommandResult {
    /// Whether this command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Runs external commands in an explicit working directory.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute a command in `working_dir` and wait for it to exit.
    ///
    /// With `env`, the child sees exactly those variables; otherwise it
    /// inherits the parent environment. There is no timeout.
    pub async fn execute(
        spec: &CommandSpec,
        working_dir: &Path,
        env: Option<&BTreeMap<String, String>>,
    ) -> std::result::Result<CommandResult, DependencyError> {
        let start = Instant::now();

        if spec.program.is_empty() {
            return Err(DependencyError::ToolMissing {
                tool: format!("<empty command '{}'>", spec.name),
            });
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).current_dir(working_dir);
        if let Some(vars) = env {
            cmd.env_clear().envs(vars);
        }

        debug!(command = %spec.name, cwd = ?working_dir, "Spawning {}", spec.command_line());

        let spawn_err = |e: std::io::Error| match e.kind() {
            ErrorKind::NotFound => DependencyError::ToolMissing {
                tool: spec.program.clone(),
            },
            _ => DependencyError::Spawn {
                tool: spec.program.clone(),
                source: e,
            },
        };

        let (status, stdout, stderr) = match spec.output {
            OutputMode::Capture => {
                let child = cmd
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(spawn_err)?;
                let output = child.wait_with_output().await.map_err(spawn_err)?;
                (
                    output.status,
                    String::from_utf8_lossy(&output.stdout).to_string(),
                    String::from_utf8_lossy(&output.stderr).to_string(),
                )
            }
            OutputMode::Inherit => {
                let mut child = cmd.spawn().map_err(spawn_err)?;
                let status = child.wait().await.map_err(spawn_err)?;
                (status, String::new(), String::new())
            }
        };

        Ok(CommandResult {
            name: spec.name.clone(),
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
            success: status.success(),
        })
    }
}

/// A successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The lexicographically last matching artifact.
    pub artifact: PathBuf,

    /// The build command's result.
    pub command: CommandResult,
}

/// Run the build command in `source_dir` and locate its artifact.
///
/// Succeeds only when the command exits 0 and at least one artifact
/// matches `artifacts` afterwards.
pub async fn invoke_build(
    source_dir: &Path,
    command: &CommandSpec,
    env: &BuildEnvironment,
    artifacts: &ArtifactQuery,
    sink: &dyn BuildEventSink,
) -> Result<BuildOutcome> {
    if !source_dir.is_dir() {
        return Err(BuildError::SourceMissing(source_dir.to_path_buf()));
    }

    sink.record(&BuildEvent::CommandStarted {
        name: command.name.clone(),
        command: command.command_line(),
    });

    let result = CommandRunner::execute(command, source_dir, Some(env.vars())).await?;

    sink.record(&BuildEvent::CommandFinished {
        name: result.name.clone(),
        exit_code: result.exit_code,
        duration_ms: result.duration_ms,
    });

    if !result.passed() {
        return Err(BuildError::CommandFailed {
            name: result.name,
            code: result.exit_code,
        });
    }

    let artifact = artifacts
        .latest(source_dir)?
        .ok_or_else(|| BuildError::NoArtifact {
            dir: artifacts.output_dir(source_dir),
            suffix: artifacts.suffix.clone(),
        })?;

    sink.record(&BuildEvent::ArtifactProduced {
        path: artifact.clone(),
    });

    Ok(BuildOutcome {
        artifact,
        command: result,
    })
}
