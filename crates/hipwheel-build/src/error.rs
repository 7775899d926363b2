//! Error types for hipwheel-build

use hipwheel_toolkit::{DefineTableError, ResolutionError};
use std::path::PathBuf;
use thiserror::Error;

/// A required external tool is missing or misbehaved
#[derive(Error, Debug)]
pub enum DependencyError {
    /// Program not found on PATH
    #[error("required tool not found: {tool}")]
    ToolMissing { tool: String },

    /// Program exists but could not be started
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Helper command (git, pip) exited non-zero
    #[error("{tool} exited with code {code}: {stderr}")]
    CommandFailed {
        tool: String,
        code: i32,
        stderr: String,
    },
}

/// The build command failed or produced nothing
#[derive(Error, Debug)]
pub enum BuildError {
    /// Build command exited non-zero
    #[error("build command '{name}' exited with code {code}")]
    CommandFailed { name: String, code: i32 },

    /// Build command exited zero but no artifact matched
    #[error("no artifact matching *{suffix} found in {dir:?}")]
    NoArtifact { dir: PathBuf, suffix: String },

    /// Source directory does not exist
    #[error("source directory not found: {0:?}")]
    SourceMissing(PathBuf),

    /// IO error while scanning for artifacts
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// Any failure of a build pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    DefineTable(#[from] DefineTableError),
}

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
