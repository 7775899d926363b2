//! Error types for hipwheel-toolkit

use crate::version::ToolkitVersion;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating the ROCm toolkit
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The default installation path does not exist
    #[error("toolkit not found at {0:?}")]
    NotFound(PathBuf),

    /// Every detection strategy failed to yield a version
    #[error("no valid installation found at {0:?}")]
    NoValidInstallation(PathBuf),
}

/// Errors raised while loading a version-define table
#[derive(Error, Debug)]
pub enum DefineTableError {
    /// IO error
    #[error("IO error reading define table: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("invalid define table: {0}")]
    Json(#[from] serde_json::Error),

    /// A define name that cannot be passed to the compiler
    #[error("invalid define name: {0:?}")]
    InvalidName(String),

    /// A weighted encoding does not fit in 64 bits for this version
    #[error("define {name} overflows for version {version}")]
    Overflow {
        name: String,
        version: ToolkitVersion,
    },
}
