//! Toolkit version triples and pattern extraction

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A `major.minor.patch` toolkit version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ToolkitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolkitVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        ToolkitVersion {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for ToolkitVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Matches `<name>-<major>.<minor>.<patch>` anywhere in a string
#[derive(Debug, Clone)]
pub struct VersionPattern {
    regex: Regex,
}

impl VersionPattern {
    /// Build a pattern for the given name. The name is matched literally.
    pub fn new(name: &str) -> Self {
        let pattern = format!(r"{}-(\d+)\.(\d+)\.(\d+)", regex::escape(name));
        let regex = Regex::new(&pattern).expect("escaped version pattern is a valid regex");
        VersionPattern { regex }
    }

    /// Extract the first version found in `haystack`.
    ///
    /// Components that overflow `u32` count as no match.
    pub fn extract(&self, haystack: &str) -> Option<ToolkitVersion> {
        let caps = self.regex.captures(haystack)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = caps.get(3)?.as_str().parse().ok()?;
        Some(ToolkitVersion::new(major, minor, patch))
    }
}
