//! External command definitions.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happens to a command's stdout and stderr.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Stream to the parent's terminal.
    #[default]
    Inherit,

    /// Capture into the result.
    Capture,
}

/// An external command to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    /// Human-readable command name.
    pub name: String,

    /// Executable.
    pub program: String,

    /// Arguments.
    pub args: Vec<String>,

    /// Output handling.
    pub output: OutputMode,
}

impl CommandSpec {
    /// Create a command from a name and an argv (first element is the executable).
    pub fn custom(name: &str, command: Vec<String>) -> Self {
        let mut argv = command.into_iter();
        Self {
            name: name.to_string(),
            program: argv.next().unwrap_or_default(),
            args: argv.collect(),
            output: OutputMode::Inherit,
        }
    }

    /// `<python> setup.py bdist_wheel`
    pub fn bdist_wheel(python: &str) -> Self {
        Self::custom(
            "bdist_wheel",
            vec![python.to_string(), "setup.py".to_string(), "bdist_wheel".to_string()],
        )
    }

    /// `git clone --recursive <url> <dest>`
    pub fn git_clone(url: &str, dest: &Path) -> Self {
        Self::custom(
            "git_clone",
            vec![
                "git".to_string(),
                "clone".to_string(),
                "--recursive".to_string(),
                url.to_string(),
                dest.to_string_lossy().into_owned(),
            ],
        )
    }

    /// `git submodule sync --recursive`
    pub fn submodule_sync() -> Self {
        Self::custom(
            "git_submodule_sync",
            vec![
                "git".to_string(),
                "submodule".to_string(),
                "sync".to_string(),
                "--recursive".to_string(),
            ],
        )
        .captured()
    }

    /// `git submodule update --init --recursive`
    pub fn submodule_update() -> Self {
        Self::custom(
            "git_submodule_update",
            vec![
                "git".to_string(),
                "submodule".to_string(),
                "update".to_string(),
                "--init".to_string(),
                "--recursive".to_string(),
            ],
        )
    }

    /// `git apply <patch>`
    pub fn git_apply(patch: &Path) -> Self {
        Self::custom(
            "git_apply",
            vec![
                "git".to_string(),
                "apply".to_string(),
                patch.to_string_lossy().into_owned(),
            ],
        )
        .captured()
    }

    /// `<python> -m pip install -r <requirements>`
    pub fn pip_install_requirements(python: &str, requirements: &Path) -> Self {
        Self::custom(
            "pip_install",
            vec![
                python.to_string(),
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
                "-r".to_string(),
                requirements.to_string_lossy().into_owned(),
            ],
        )
    }

    /// Capture output instead of streaming it.
    pub fn captured(mut self) -> Self {
        self.output = OutputMode::Capture;
        self
    }

    /// The full command line, space separated.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_custom_splits_program() {
        let spec = CommandSpec::custom("echo_test", vec!["echo".to_string(), "hello".to_string()]);
        assert_eq!(spec.name, "echo_test");
        assert_eq!(spec.program, "echo");
        assert_eq!(spec.args, vec!["hello".to_string()]);
        assert_eq!(spec.output, OutputMode::Inherit);
    }

    #[test]
    fn test_custom_empty_command() {
        let spec = CommandSpec::custom("empty", vec![]);
        assert!(spec.program.is_empty());
        assert!(spec.args.is_empty());
    }

    #[test]
    fn test_bdist_wheel() {
        let spec = CommandSpec::bdist_wheel("python3.11");
        assert_eq!(spec.command_line(), "python3.11 setup.py bdist_wheel");
    }

    #[test]
    fn test_git_commands() {
        let clone = CommandSpec::git_clone("https://github.com/pytorch/vision", &PathBuf::from("/w/vision"));
        assert_eq!(
            clone.command_line(),
            "git clone --recursive https://github.com/pytorch/vision /w/vision"
        );

        let update = CommandSpec::submodule_update();
        assert_eq!(update.command_line(), "git submodule update --init --recursive");

        let apply = CommandSpec::git_apply(&PathBuf::from("/p/vision.patch"));
        assert_eq!(apply.output, OutputMode::Capture);
        assert_eq!(apply.command_line(), "git apply /p/vision.patch");
    }

    #[test]
    fn test_pip_install() {
        let spec = CommandSpec::pip_install_requirements("python3", &PathBuf::from("requirements.txt"));
        assert_eq!(spec.command_line(), "python3 -m pip install -r requirements.txt");
    }

    #[test]
    fn test_captured() {
        let spec = CommandSpec::bdist_wheel("python3").captured();
        assert_eq!(spec.output, OutputMode::Capture);
    }
}
