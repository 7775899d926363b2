//! In-memory fakes for toolkit traits (testing only)
//!
//! Provides `StaticDiagnostic`, a `DiagnosticTool` with a canned answer
//! that counts how often it was queried.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::resolver::DiagnosticTool;

/// Diagnostic tool returning a fixed output, or failing
#[derive(Debug, Default)]
pub struct StaticDiagnostic {
    output: Option<String>,
    calls: AtomicUsize,
}

impl StaticDiagnostic {
    /// A tool that exits successfully and prints `output`
    pub fn answering(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A tool that is missing or exits non-zero
    pub fn failing() -> Self {
        Self::default()
    }

    /// Number of `show_version` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DiagnosticTool for StaticDiagnostic {
    fn show_version(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone()
    }
}
