//! Locating build artifacts after a successful build.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where artifacts land and how their file names end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactQuery {
    /// Output directory, relative to the source tree.
    pub dir: PathBuf,

    /// File name suffix, e.g. `.whl`.
    pub suffix: String,
}

impl Default for ArtifactQuery {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist"),
            suffix: ".whl".to_string(),
        }
    }
}

impl ArtifactQuery {
    pub fn new(dir: impl Into<PathBuf>, suffix: &str) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.to_string(),
        }
    }

    /// Output directory for `source_dir`.
    pub fn output_dir(&self, source_dir: &Path) -> PathBuf {
        source_dir.join(&self.dir)
    }

    /// Matching files under `source_dir`, sorted by path.
    ///
    /// A missing output directory yields no matches.
    pub fn find(&self, source_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let dir = self.output_dir(source_dir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            if path.is_file() && name.to_string_lossy().ends_with(&self.suffix) {
                matches.push(path);
            }
        }

        matches.sort();
        Ok(matches)
    }

    /// The lexicographically last match, if any.
    pub fn latest(&self, source_dir: &Path) -> std::io::Result<Option<PathBuf>> {
        Ok(self.find(source_dir)?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_query() {
        let query = ArtifactQuery::default();
        assert_eq!(query.dir, PathBuf::from("dist"));
        assert_eq!(query.suffix, ".whl");
    }

    #[test]
    fn test_missing_dir_has_no_artifacts() {
        let dir = tempdir().unwrap();
        assert!(ArtifactQuery::default().find(dir.path()).unwrap().is_empty());
        assert_eq!(ArtifactQuery::default().latest(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_latest_is_lexicographically_last() {
        let dir = tempdir().unwrap();
        let dist = dir.path().join("dist");
        std::fs::create_dir(&dist).unwrap();
        std::fs::write(dist.join("torch-2.4.0-cp311-linux_x86_64.whl"), b"").unwrap();
        std::fs::write(dist.join("torch-2.5.0-cp311-linux_x86_64.whl"), b"").unwrap();
        std::fs::write(dist.join("torch-2.6.0.tar.gz"), b"").unwrap();
        std::fs::create_dir(dist.join("torch-9.9.9.whl")).unwrap();

        let query = ArtifactQuery::default();
        assert_eq!(query.find(dir.path()).unwrap().len(), 2);
        assert_eq!(
            query.latest(dir.path()).unwrap(),
            Some(dist.join("torch-2.5.0-cp311-linux_x86_64.whl"))
        );
    }

    #[test]
    fn test_custom_suffix() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("pkg-1.0-result.bin"), b"").unwrap();

        let query = ArtifactQuery::new("out", ".bin");
        assert_eq!(query.latest(dir.path()).unwrap(), Some(out.join("pkg-1.0-result.bin")));
    }
}
