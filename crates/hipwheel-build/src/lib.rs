//! hipwheel-build - Wheel Builds Against a Local ROCm Toolkit
//!
//! Provides the build orchestrator that:
//! - Resolves the ROCm toolkit and synthesises the build environment
//! - Clones, patches and prepares third-party source trees
//! - Runs the wheel build in an explicit working directory
//! - Reports progress through an injectable event sink

pub mod artifact;
pub mod command;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod runner;
pub mod sources;
pub mod telemetry;

// Re-export key types
pub use artifact::ArtifactQuery;
pub use command::{CommandSpec, OutputMode};
pub use error::{BuildError, DependencyError, PipelineError};
pub use events::{BuildEvent, BuildEventSink, BuildPhase, MemorySink, TracingSink};
pub use pipeline::{BuildPipeline, BuildReport, BuildRequest, BuiltArtifact};
pub use runner::{invoke_build, BuildOutcome, CommandResult, CommandRunner};
pub use sources::{prepare_source, SubProject};
pub use telemetry::init_tracing;
