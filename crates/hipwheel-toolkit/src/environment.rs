//! Build environment synthesis
//!
//! Turns a resolved toolchain and a GPU target into the environment handed
//! to the wheel build: toolkit paths, search-path prefixes, and two flag
//! blobs (hipcc flags and CMake arguments).

use crate::defines::DefineTable;
use crate::error::DefineTableError;
use crate::resolver::ToolchainInfo;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Variable holding the joined compiler flags (also mirrored to
/// `HIP_HIPCC_FLAGS` and `CMAKE_HIP_FLAGS`)
pub const COMPILER_FLAGS_KEY: &str = "HIPCC_COMPILE_FLAGS_APPEND";

/// Variable holding the joined build-system arguments
pub const CMAKE_ARGS_KEY: &str = "CMAKE_ARGS";

/// Environment for one build invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
    compiler_flags: Vec<String>,
    cmake_args: Vec<String>,
}

impl BuildEnvironment {
    /// Snapshot of the current process environment, for use as `base`
    pub fn capture_base() -> BTreeMap<String, String> {
        std::env::vars().collect()
    }

    /// Every variable the build process receives
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn compiler_flags(&self) -> &[String] {
        &self.compiler_flags
    }

    pub fn cmake_args(&self) -> &[String] {
        &self.cmake_args
    }

    /// The joined compiler flags
    pub fn compiler_flags_blob(&self) -> &str {
        self.get(COMPILER_FLAGS_KEY).unwrap_or_default()
    }

    /// The joined build-system arguments
    pub fn cmake_args_blob(&self) -> &str {
        self.get(CMAKE_ARGS_KEY).unwrap_or_default()
    }

    /// SHA-256 over the sorted variables
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.vars {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }

    /// Short fingerprint (first 12 characters)
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint()[..12].to_string()
    }
}

/// Derive the build environment for `info` and `target_arch`.
///
/// `base` is the inherited environment; the result is a pure function of
/// the inputs, so equal inputs yield byte-identical flag blobs. Fails only
/// when a define in `defines` overflows for the resolved version.
pub fn synthesize_environment(
    info: &ToolchainInfo,
    target_arch: &str,
    base: &BTreeMap<String, String>,
    defines: &DefineTable,
) -> Result<BuildEnvironment, DefineTableError> {
    let root = info.install_path.to_string_lossy().into_owned();
    let sub = |rel: &str| join(&info.install_path, rel);

    let mut vars = base.clone();
    let overrides = [
        ("ROCM_HOME", root.clone()),
        ("ROCM_PATH", root.clone()),
        ("HIP_PATH", sub("hip")),
        ("HIP_PLATFORM", "amd".to_string()),
        ("HIP_COMPILER", "clang".to_string()),
        ("HIP_RUNTIME", "rocclr".to_string()),
        ("HIP_CLANG_PATH", sub("llvm/bin")),
        ("HIPCC_PATH", sub("bin/hipcc")),
        (
            "PATH",
            prepend(&[sub("bin"), sub("llvm/bin")], base.get("PATH")),
        ),
        ("LD_LIBRARY_PATH", prepend(&[sub("lib")], base.get("LD_LIBRARY_PATH"))),
        (
            "CMAKE_PREFIX_PATH",
            prepend(&[sub("lib/cmake/hip")], base.get("CMAKE_PREFIX_PATH")),
        ),
        ("USE_ROCM", "1".to_string()),
        ("USE_CUDA", "0".to_string()),
        ("USE_NINJA", "1".to_string()),
        ("PYTORCH_ROCM_ARCH", target_arch.to_string()),
        ("ROCM_VERSION_STRING", info.version.to_string()),
    ];
    for (key, value) in overrides {
        vars.insert(key.to_string(), value);
    }

    let version_defines = defines.compiler_flags(&info.version)?;

    let mut compiler_flags = vec![
        format!("--rocm-path={}", root),
        format!("--offload-arch={}", target_arch),
        "-D__HIP_PLATFORM_AMD__=1".to_string(),
        "-D_GLIBCXX_USE_CXX11_ABI=0".to_string(),
    ];
    compiler_flags.extend(version_defines.iter().cloned());

    let mut cmake_args = vec![
        format!("-DCMAKE_HIP_ARCHITECTURES={}", target_arch),
        format!("-DROCM_PATH={}", root),
    ];
    cmake_args.extend(version_defines);
    cmake_args.extend(
        [
            "-DUSE_ROCM=ON",
            "-DUSE_CUDA=OFF",
            "-DCMAKE_CXX_STANDARD=17",
            "-DCMAKE_VERBOSE_MAKEFILE=ON",
        ]
        .map(String::from),
    );

    let flags_blob = compiler_flags.join(" ");
    for key in [COMPILER_FLAGS_KEY, "HIP_HIPCC_FLAGS", "CMAKE_HIP_FLAGS"] {
        vars.insert(key.to_string(), flags_blob.clone());
    }
    vars.insert(CMAKE_ARGS_KEY.to_string(), cmake_args.join(" "));

    Ok(BuildEnvironment {
        vars,
        compiler_flags,
        cmake_args,
    })
}

fn join(root: &Path, rel: &str) -> String {
    root.join(rel).to_string_lossy().into_owned()
}

/// `a:b:<existing>`, keeping the trailing separator when `existing` is unset
fn prepend(entries: &[String], existing: Option<&String>) -> String {
    let mut value = entries.join(":");
    value.push(':');
    if let Some(existing) = existing {
        value.push_str(existing);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defines::DefineTable;
    use crate::resolver::VersionSource;
    use crate::version::ToolkitVersion;
    use std::path::PathBuf;

    fn info() -> ToolchainInfo {
        ToolchainInfo {
            install_path: PathBuf::from("/opt/rocm"),
            version: ToolkitVersion::new(6, 3, 1),
            source: VersionSource::Diagnostic,
        }
    }

    fn base() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/builder".to_string()),
        ])
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let a = synthesize_environment(&info(), "gfx1102", &base(), &DefineTable::legacy()).unwrap();
        let b = synthesize_environment(&info(), "gfx1102", &base(), &DefineTable::legacy()).unwrap();

        assert_eq!(a.compiler_flags_blob(), b.compiler_flags_blob());
        assert_eq!(a.cmake_args_blob(), b.cmake_args_blob());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_path_variables() {
        let env = synthesize_environment(&info(), "gfx1102", &base(), &DefineTable::empty()).unwrap();

        assert_eq!(env.get("ROCM_HOME"), Some("/opt/rocm"));
        assert_eq!(env.get("ROCM_PATH"), Some("/opt/rocm"));
        assert_eq!(env.get("HIP_PATH"), Some("/opt/rocm/hip"));
        assert_eq!(env.get("HIP_CLANG_PATH"), Some("/opt/rocm/llvm/bin"));
        assert_eq!(env.get("HIPCC_PATH"), Some("/opt/rocm/bin/hipcc"));
        assert_eq!(env.get("PATH"), Some("/opt/rocm/bin:/opt/rocm/llvm/bin:/usr/bin"));
        assert_eq!(env.get("LD_LIBRARY_PATH"), Some("/opt/rocm/lib:"));
        assert_eq!(env.get("CMAKE_PREFIX_PATH"), Some("/opt/rocm/lib/cmake/hip:"));
        assert_eq!(env.get("PYTORCH_ROCM_ARCH"), Some("gfx1102"));
        assert_eq!(env.get("ROCM_VERSION_STRING"), Some("6.3.1"));
        assert_eq!(env.get("HOME"), Some("/home/builder"), "Base variables are kept");
    }

    #[test]
    fn test_compiler_flags_order() {
        let env = synthesize_environment(&info(), "gfx90a", &base(), &DefineTable::legacy()).unwrap();

        assert_eq!(
            env.compiler_flags_blob(),
            "--rocm-path=/opt/rocm --offload-arch=gfx90a -D__HIP_PLATFORM_AMD__=1 \
             -D_GLIBCXX_USE_CXX11_ABI=0 -DROCM_VERSION=631"
        );
        assert_eq!(env.get("HIP_HIPCC_FLAGS"), Some(env.compiler_flags_blob()));
        assert_eq!(env.get("CMAKE_HIP_FLAGS"), Some(env.compiler_flags_blob()));
    }

    #[test]
    fn test_cmake_args() {
        let env = synthesize_environment(&info(), "gfx90a", &base(), &DefineTable::legacy()).unwrap();

        assert_eq!(
            env.cmake_args(),
            &[
                "-DCMAKE_HIP_ARCHITECTURES=gfx90a",
                "-DROCM_PATH=/opt/rocm",
                "-DROCM_VERSION=631",
                "-DUSE_ROCM=ON",
                "-DUSE_CUDA=OFF",
                "-DCMAKE_CXX_STANDARD=17",
                "-DCMAKE_VERBOSE_MAKEFILE=ON",
            ]
        );
        assert_eq!(env.cmake_args_blob(), env.cmake_args().join(" "));
    }

    #[test]
    fn test_no_version_defines_with_empty_table() {
        let env = synthesize_environment(&info(), "gfx1102", &base(), &DefineTable::empty()).unwrap();
        assert_eq!(env.compiler_flags().len(), 4);
        assert!(!env.compiler_flags_blob().contains("ROCM_VERSION"));
    }

    #[test]
    fn test_fingerprint_tracks_target_arch() {
        let a = synthesize_environment(&info(), "gfx1102", &base(), &DefineTable::empty()).unwrap();
        let b = synthesize_environment(&info(), "gfx1100", &base(), &DefineTable::empty()).unwrap();

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_eq!(a.short_fingerprint().len(), 12);
    }

    #[test]
    fn test_base_overrides_are_replaced() {
        let mut base = base();
        base.insert("HIP_PLATFORM".to_string(), "nvidia".to_string());
        base.insert("LD_LIBRARY_PATH".to_string(), "/usr/lib".to_string());

        let env = synthesize_environment(&info(), "gfx1102", &base, &DefineTable::empty()).unwrap();
        assert_eq!(env.get("HIP_PLATFORM"), Some("amd"));
        assert_eq!(env.get("LD_LIBRARY_PATH"), Some("/opt/rocm/lib:/usr/lib"));
    }

    #[test]
    fn test_overflowing_define_fails_synthesis() {
        let defines = DefineTable::empty().with_define(
            "ROCM_VERSION",
            crate::defines::VersionEncoding::Weighted {
                major: u64::MAX,
                minor: 0,
                patch: 0,
                offset: 0,
            },
        );

        let err = synthesize_environment(&info(), "gfx1102", &base(), &defines).unwrap_err();
        assert!(matches!(err, DefineTableError::Overflow { .. }));
    }
}
