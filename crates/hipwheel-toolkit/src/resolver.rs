//! ROCm installation discovery
//!
//! Locates the toolkit and determines its version. The strategies are tried
//! in order of decreasing reliability:
//! 1. The symlink target of the default path (`/opt/rocm -> /opt/rocm-6.3.1`)
//! 2. The diagnostic tool (`rocm-smi --showversion`)
//! 3. Sibling directories named `<root>-*` next to the default path

use crate::error::ResolutionError;
use crate::version::{ToolkitVersion, VersionPattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Default ROCm installation root
pub const DEFAULT_ROCM_PATH: &str = "/opt/rocm";

/// How to pick one sibling directory out of several `<root>-*` candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelection {
    /// Sort paths as strings and take the last one.
    ///
    /// `rocm-6.9.0` sorts after `rocm-6.10.0`, so this is not numeric order.
    #[default]
    Lexicographic,
    /// Take the highest parsed version
    Semantic,
}

/// Which strategy produced the version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// Parsed from the symlink target of the default path
    Symlink,
    /// Parsed from the diagnostic tool output
    Diagnostic,
    /// Parsed from a sibling directory name
    SiblingDirectory,
}

/// A resolved toolkit installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    /// Installation root (always the configured default path)
    pub install_path: PathBuf,
    /// Detected version
    pub version: ToolkitVersion,
    /// Strategy that produced `version`
    pub source: VersionSource,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Installation root that must exist
    pub default_path: PathBuf,
    /// Name in `<name>-M.m.p` symlink targets and sibling directories
    pub toolkit_name: String,
    /// Name in `<Name>-M.m.p` diagnostic output
    pub diagnostic_name: String,
    /// Diagnostic program, invoked with `--showversion`
    pub diagnostic_tool: String,
    /// Sibling directory selection policy
    pub selection: VersionSelection,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            default_path: PathBuf::from(DEFAULT_ROCM_PATH),
            toolkit_name: "rocm".to_string(),
            diagnostic_name: "ROCm".to_string(),
            diagnostic_tool: "rocm-smi".to_string(),
            selection: VersionSelection::default(),
        }
    }
}

impl ResolverConfig {
    /// Defaults, with `ROCM_PATH` overriding the installation root
    pub fn from_env() -> Self {
        match std::env::var("ROCM_PATH") {
            Ok(path) if !path.is_empty() => Self::default().with_default_path(path),
            _ => Self::default(),
        }
    }

    /// Set the installation root.
    ///
    /// The toolkit name follows the root's file name, so `/opt/rocm`
    /// searches `rocm-*` and `/tmp/x/toolkit` searches `toolkit-*`.
    /// Trailing separators are dropped.
    pub fn with_default_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = normalize_root(&path.into());
        if let Some(name) = self.default_path.file_name() {
            self.toolkit_name = name.to_string_lossy().into_owned();
        }
        self
    }

    pub fn with_diagnostic_name(mut self, name: &str) -> Self {
        self.diagnostic_name = name.to_string();
        self
    }

    pub fn with_diagnostic_tool(mut self, tool: &str) -> Self {
        self.diagnostic_tool = tool.to_string();
        self
    }

    pub fn with_selection(mut self, selection: VersionSelection) -> Self {
        self.selection = selection;
        self
    }
}

/// A command-line tool that reports the installed toolkit version
pub trait DiagnosticTool {
    /// Stdout of a successful `--showversion` run, or `None` if the tool
    /// is missing or exited non-zero
    fn show_version(&self) -> Option<String>;
}

impl<T: DiagnosticTool + ?Sized> DiagnosticTool for &T {
    fn show_version(&self) -> Option<String> {
        (**self).show_version()
    }
}

/// `rocm-smi --showversion`
#[derive(Debug, Clone)]
pub struct RocmSmi {
    program: String,
}

impl RocmSmi {
    pub fn new(program: &str) -> Self {
        RocmSmi {
            program: program.to_string(),
        }
    }
}

impl Default for RocmSmi {
    fn default() -> Self {
        Self::new("rocm-smi")
    }
}

impl DiagnosticTool for RocmSmi {
    fn show_version(&self) -> Option<String> {
        match Command::new(&self.program).arg("--showversion").output() {
            Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
            Ok(out) => {
                debug!(
                    tool = %self.program,
                    code = ?out.status.code(),
                    "Diagnostic tool exited unsuccessfully"
                );
                None
            }
            Err(e) => {
                debug!(tool = %self.program, error = %e, "Diagnostic tool could not be run");
                None
            }
        }
    }
}

/// Locates the toolkit installation and its version
pub struct ToolkitResolver<D = RocmSmi> {
    config: ResolverConfig,
    tool: D,
}

impl ToolkitResolver<RocmSmi> {
    /// Create a resolver that queries the configured diagnostic program
    pub fn new(config: ResolverConfig) -> Self {
        let tool = RocmSmi::new(&config.diagnostic_tool);
        ToolkitResolver { config, tool }
    }
}

impl<D: DiagnosticTool> ToolkitResolver<D> {
    /// Create a resolver with a custom diagnostic tool
    pub fn with_tool(config: ResolverConfig, tool: D) -> Self {
        ToolkitResolver { config, tool }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the installation path and version.
    ///
    /// Fails immediately, without trying any strategy, when the default
    /// path does not exist.
    pub fn resolve(&self) -> Result<ToolchainInfo, ResolutionError> {
        // `lstat` on `rocm/` follows the link, so probe `rocm`
        let root = normalize_root(&self.config.default_path);
        info!("Resolving ROCm toolkit at {:?}", root);

        if !root.exists() {
            return Err(ResolutionError::NotFound(root));
        }

        // Strategy 1: versioned symlink target
        if let Some(version) = self.version_from_symlink(&root) {
            return Ok(Self::found(root, version, VersionSource::Symlink));
        }

        // Strategy 2: diagnostic tool
        if let Some(version) = self.version_from_diagnostic() {
            return Ok(Self::found(root, version, VersionSource::Diagnostic));
        }

        // Strategy 3: sibling directory names
        warn!("Diagnostic tool gave no version, guessing from sibling directories");
        if let Some(version) = self.version_from_siblings(&root) {
            return Ok(Self::found(root, version, VersionSource::SiblingDirectory));
        }

        Err(ResolutionError::NoValidInstallation(root))
    }

    fn found(root: PathBuf, version: ToolkitVersion, source: VersionSource) -> ToolchainInfo {
        info!(version = %version, source = ?source, "ROCm toolkit resolved");
        ToolchainInfo {
            install_path: root,
            version,
            source,
        }
    }

    fn version_from_symlink(&self, root: &Path) -> Option<ToolkitVersion> {
        let meta = std::fs::symlink_metadata(root).ok()?;
        if !meta.file_type().is_symlink() {
            return None;
        }

        let target = std::fs::read_link(root).ok()?;
        debug!("{:?} links to {:?}", root, target);
        VersionPattern::new(&self.config.toolkit_name).extract(&target.to_string_lossy())
    }

    fn version_from_diagnostic(&self) -> Option<ToolkitVersion> {
        let output = self.tool.show_version()?;
        VersionPattern::new(&self.config.diagnostic_name).extract(&output)
    }

    fn version_from_siblings(&self, root: &Path) -> Option<ToolkitVersion> {
        let name = root.file_name()?.to_string_lossy().into_owned();
        let parent = match root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let prefix = format!("{}-", name);
        let candidates: Vec<PathBuf> = std::fs::read_dir(parent)
            .ok()?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect();

        debug!("Found {} sibling candidates for {}", candidates.len(), prefix);

        let pattern = VersionPattern::new(&self.config.toolkit_name);
        let chosen = select_sibling(&candidates, self.config.selection, &pattern)?;
        debug!("Selected sibling {:?}", chosen);
        pattern.extract(&chosen.file_name()?.to_string_lossy())
    }
}

fn normalize_root(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Pick one candidate directory according to `selection`.
///
/// `Lexicographic` returns the last path in string order even if its name
/// carries no parseable version. `Semantic` ignores unparseable names.
pub fn select_sibling(
    candidates: &[PathBuf],
    selection: VersionSelection,
    pattern: &VersionPattern,
) -> Option<PathBuf> {
    match selection {
        VersionSelection::Lexicographic => {
            let mut sorted = candidates.to_vec();
            sorted.sort();
            sorted.pop()
        }
        VersionSelection::Semantic => candidates
            .iter()
            .filter_map(|p| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                pattern.extract(&name).map(|v| (v, p))
            })
            .max_by(|(va, pa), (vb, pb)| va.cmp(vb).then_with(|| pa.cmp(pb)))
            .map(|(_, p)| p.clone()),
    }
}
