//! Build events and the sinks that receive them.
//!
//! Pipeline steps report progress through an explicit [`BuildEventSink`]
//! rather than a process-wide logger, so callers decide where events go.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};

/// Pipeline state: `Idle → Resolving → EnvironmentReady → Building → {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Idle,
    Resolving,
    EnvironmentReady,
    Building,
    Succeeded,
    Failed,
}

impl BuildPhase {
    /// Get the phase name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuildPhase::Idle => "idle",
            BuildPhase::Resolving => "resolving",
            BuildPhase::EnvironmentReady => "environment_ready",
            BuildPhase::Building => "building",
            BuildPhase::Succeeded => "succeeded",
            BuildPhase::Failed => "failed",
        }
    }

    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildPhase::Succeeded | BuildPhase::Failed)
    }

    /// Whether `next` is a legal successor of this phase.
    ///
    /// `Building → Building` is allowed for multi-project runs. Any
    /// non-terminal phase may fail.
    pub fn can_advance_to(&self, next: BuildPhase) -> bool {
        use BuildPhase::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Idle, Resolving)
            | (Resolving, EnvironmentReady)
            | (EnvironmentReady, Building)
            | (Building, Building)
            | (Building, Succeeded) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Something that happened during a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildEvent {
    PhaseChanged {
        phase: BuildPhase,
    },
    ToolkitResolved {
        path: PathBuf,
        version: String,
        source: String,
    },
    EnvironmentReady {
        fingerprint: String,
        variables: usize,
    },
    CommandStarted {
        name: String,
        command: String,
    },
    CommandFinished {
        name: String,
        exit_code: i32,
        duration_ms: u64,
    },
    ArtifactProduced {
        path: PathBuf,
    },
    Failed {
        message: String,
    },
}

/// Receiver of build events.
pub trait BuildEventSink: Send + Sync {
    fn record(&self, event: &BuildEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl BuildEventSink for TracingSink {
    fn record(&self, event: &BuildEvent) {
        match event {
            BuildEvent::PhaseChanged { phase } => info!(phase = %phase, "Build phase changed"),
            BuildEvent::ToolkitResolved {
                path,
                version,
                source,
            } => info!(path = ?path, version = %version, source = %source, "ROCm {} found", version),
            BuildEvent::EnvironmentReady {
                fingerprint,
                variables,
            } => info!(fingerprint = %fingerprint, variables, "Build environment ready"),
            BuildEvent::CommandStarted { name, command } => {
                info!(command = %name, "Running {}", command)
            }
            BuildEvent::CommandFinished {
                name,
                exit_code,
                duration_ms,
            } => info!(command = %name, exit_code, duration_ms, "Command finished"),
            BuildEvent::ArtifactProduced { path } => info!("Build completed: {}", path.display()),
            BuildEvent::Failed { message } => error!("Build failed: {}", message),
        }
    }
}

/// Captures events in order (testing only).
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<BuildEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Phases in the order they were entered.
    pub fn phases(&self) -> Vec<BuildPhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BuildEvent::PhaseChanged { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }

    /// Artifact paths in the order they were produced.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BuildEvent::ArtifactProduced { path } => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl BuildEventSink for MemorySink {
    fn record(&self, event: &BuildEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
