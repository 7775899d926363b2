//! hipwheel-toolkit: ROCm Detection and Build Environment Synthesis
//!
//! This crate finds the local ROCm installation and turns it into the
//! environment a wheel build needs.
//!
//! ## Detection
//!
//! [`ToolkitResolver`] tries a versioned symlink, then `rocm-smi`, then
//! sibling `rocm-*` directories. The first strategy that yields a version wins.
//!
//! ## Environment
//!
//! [`synthesize_environment`] is a pure function of the resolved toolchain,
//! the GPU target, the inherited environment and a [`DefineTable`].

pub mod defines;
pub mod environment;
pub mod error;
pub mod fakes;
pub mod resolver;
pub mod version;

pub use defines::{DefineTable, VersionComponent, VersionDefine, VersionEncoding};
pub use environment::{synthesize_environment, BuildEnvironment, CMAKE_ARGS_KEY, COMPILER_FLAGS_KEY};
pub use error::{DefineTableError, ResolutionError};
pub use resolver::{
    select_sibling, DiagnosticTool, ResolverConfig, RocmSmi, ToolchainInfo, ToolkitResolver,
    VersionSelection, VersionSource, DEFAULT_ROCM_PATH,
};
pub use version::{ToolkitVersion, VersionPattern};

/// Result type for toolkit resolution
pub type Result<T> = std::result::Result<T, ResolutionError>;
