//! Version-derived preprocessor defines
//!
//! Build scripts encode the toolkit version into numeric defines, and they
//! do not agree on the arithmetic. The encoding is therefore a table that
//! callers load or choose, never a fixed formula.
//!
//! ```json
//! { "defines": [
//!     { "name": "ROCM_VERSION",
//!       "encoding": { "kind": "weighted", "major": 100, "minor": 10, "patch": 0, "offset": 1 } },
//!     { "name": "ROCM_VERSION_MAJOR",
//!       "encoding": { "kind": "component", "component": "major" } }
//! ] }
//! ```

use crate::error::DefineTableError;
use crate::version::ToolkitVersion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// A single component of the version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionComponent {
    Major,
    Minor,
    Patch,
}

/// How a version becomes a numeric define value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionEncoding {
    /// `major * self.major + minor * self.minor + patch * self.patch + offset`
    Weighted {
        major: u64,
        minor: u64,
        patch: u64,
        #[serde(default)]
        offset: u64,
    },
    /// One component verbatim
    Component { component: VersionComponent },
}

impl VersionEncoding {
    /// Numeric value for `version`, or `None` if the weights overflow `u64`
    pub fn evaluate(&self, version: &ToolkitVersion) -> Option<u64> {
        match self {
            VersionEncoding::Weighted {
                major,
                minor,
                patch,
                offset,
            } => u64::from(version.major)
                .checked_mul(*major)?
                .checked_add(u64::from(version.minor).checked_mul(*minor)?)?
                .checked_add(u64::from(version.patch).checked_mul(*patch)?)?
                .checked_add(*offset),
            VersionEncoding::Component { component } => Some(u64::from(match component {
                VersionComponent::Major => version.major,
                VersionComponent::Minor => version.minor,
                VersionComponent::Patch => version.patch,
            })),
        }
    }
}

/// A named define and its encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDefine {
    pub name: String,
    pub encoding: VersionEncoding,
}

/// Ordered list of version defines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineTable {
    #[serde(default)]
    pub defines: Vec<VersionDefine>,
}

impl DefineTable {
    /// A table with no defines
    pub fn empty() -> Self {
        Self::default()
    }

    /// `ROCM_VERSION = major*100 + minor*10 + 1`, as used by older wheel scripts
    pub fn legacy() -> Self {
        DefineTable {
            defines: vec![VersionDefine {
                name: "ROCM_VERSION".to_string(),
                encoding: VersionEncoding::Weighted {
                    major: 100,
                    minor: 10,
                    patch: 0,
                    offset: 1,
                },
            }],
        }
    }

    /// Append a define
    pub fn with_define(mut self, name: &str, encoding: VersionEncoding) -> Self {
        self.defines.push(VersionDefine {
            name: name.to_string(),
            encoding,
        });
        self
    }

    /// Parse a table from JSON and validate define names
    pub fn from_json(json: &str) -> Result<Self, DefineTableError> {
        let table: DefineTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Load a table from a JSON file
    pub fn load(path: &Path) -> Result<Self, DefineTableError> {
        debug!("Loading define table from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<(), DefineTableError> {
        static IDENT: OnceLock<Regex> = OnceLock::new();
        let ident = IDENT.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
        });

        match self.defines.iter().find(|d| !ident.is_match(&d.name)) {
            Some(bad) => Err(DefineTableError::InvalidName(bad.name.clone())),
            None => Ok(()),
        }
    }

    /// `(name, value)` pairs in table order
    pub fn evaluate(
        &self,
        version: &ToolkitVersion,
    ) -> Result<Vec<(String, String)>, DefineTableError> {
        self.defines
            .iter()
            .map(|d| match d.encoding.evaluate(version) {
                Some(value) => Ok((d.name.clone(), value.to_string())),
                None => Err(DefineTableError::Overflow {
                    name: d.name.clone(),
                    version: *version,
                }),
            })
            .collect()
    }

    /// `-DNAME=VALUE` flags in table order
    pub fn compiler_flags(&self, version: &ToolkitVersion) -> Result<Vec<String>, DefineTableError> {
        Ok(self
            .evaluate(version)?
            .into_iter()
            .map(|(name, value)| format!("-D{}={}", name, value))
            .collect())
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_legacy_encoding() {
        let flags = DefineTable::legacy()
            .compiler_flags(&ToolkitVersion::new(6, 3, 1))
            .unwrap();
        assert_eq!(flags, vec!["-DROCM_VERSION=631".to_string()]);
    }

    #[test]
    fn test_weighted_and_component_encodings() {
        let table = DefineTable::empty()
            .with_define(
                "ROCM_VERSION_NUM",
                VersionEncoding::Weighted {
                    major: 10000,
                    minor: 100,
                    patch: 1,
                    offset: 0,
                },
            )
            .with_define(
                "ROCM_VERSION_MINOR",
                VersionEncoding::Component {
                    component: VersionComponent::Minor,
                },
            );

        let pairs = table.evaluate(&ToolkitVersion::new(6, 10, 2)).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("ROCM_VERSION_NUM".to_string(), "61002".to_string()),
                ("ROCM_VERSION_MINOR".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "defines": [
                { "name": "ROCM_VERSION",
                  "encoding": { "kind": "weighted", "major": 100, "minor": 10, "patch": 0, "offset": 1 } },
                { "name": "HIP_MAJOR",
                  "encoding": { "kind": "component", "component": "major" } }
            ]
        }"#;

        let table = DefineTable::from_json(json).unwrap();
        assert_eq!(table.defines.len(), 2);
        assert_eq!(
            table.compiler_flags(&ToolkitVersion::new(5, 7, 0)).unwrap(),
            vec!["-DROCM_VERSION=571".to_string(), "-DHIP_MAJOR=5".to_string()]
        );
    }

    #[test]
    fn test_offset_defaults_to_zero() {
        let json = r#"{"defines": [{"name": "V", "encoding": {"kind": "weighted", "major": 1, "minor": 0, "patch": 0}}]}"#;
        let table = DefineTable::from_json(json).unwrap();
        assert_eq!(
            table.compiler_flags(&ToolkitVersion::new(6, 0, 0)).unwrap(),
            vec!["-DV=6".to_string()]
        );
    }

    #[test]
    fn test_invalid_name_rejected() {
        let json = r#"{"defines": [{"name": "BAD NAME", "encoding": {"kind": "component", "component": "patch"}}]}"#;
        let err = DefineTable::from_json(json).unwrap_err();
        assert!(matches!(err, DefineTableError::InvalidName(name) if name == "BAD NAME"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("defines.json");
        std::fs::write(&path, serde_json::to_string(&DefineTable::legacy()).unwrap()).unwrap();

        let table = DefineTable::load(&path).unwrap();
        assert_eq!(table, DefineTable::legacy());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = DefineTable::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DefineTableError::Io(_)));
    }

    #[test]
    fn test_empty_table_has_no_flags() {
        let table = DefineTable::empty();
        assert!(table.is_empty());
        assert!(table
            .compiler_flags(&ToolkitVersion::new(6, 3, 1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_weight_overflow_is_an_error() {
        let json = r#"{"defines": [{"name": "HUGE", "encoding": {"kind": "weighted", "major": 18446744073709551615, "minor": 0, "patch": 0}}]}"#;
        let table = DefineTable::from_json(json).unwrap();

        let err = table
            .compiler_flags(&ToolkitVersion::new(6, 3, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            DefineTableError::Overflow { ref name, version }
                if name == "HUGE" && version == ToolkitVersion::new(6, 3, 1)
        ));

        // Major 1 times u64::MAX still fits
        assert_eq!(
            table.compiler_flags(&ToolkitVersion::new(1, 0, 0)).unwrap(),
            vec![format!("-DHUGE={}", u64::MAX)]
        );
    }

    #[test]
    fn test_offset_overflow_is_an_error() {
        let table = DefineTable::empty().with_define(
            "V",
            VersionEncoding::Weighted {
                major: u64::MAX / 6,
                minor: 0,
                patch: 0,
                offset: u64::MAX,
            },
        );
        assert!(table.evaluate(&ToolkitVersion::new(6, 0, 0)).is_err());
    }
}
