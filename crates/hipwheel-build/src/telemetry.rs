//! Tracing setup for the hipwheel binary.
//!
//! Log lines go to stderr so that the build's own stdout, which is
//! inherited by the child process, stays readable.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Crates whose events follow the requested level; everything else is
/// held at `warn` unless `RUST_LOG` says otherwise.
const HIPWHEEL_TARGETS: [&str; 3] = ["hipwheel", "hipwheel_build", "hipwheel_toolkit"];

/// Default filter directives for `level`.
fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        HIPWHEEL_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level.as_str())),
    );
    directives.join(",")
}

/// Install the global subscriber. Only the first call in a process wins.
///
/// * `json`: newline-delimited JSON instead of human-readable lines.
/// * `level`: verbosity for hipwheel's own events when `RUST_LOG` is unset.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let format = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let format = if json {
        format.json().boxed()
    } else {
        format.boxed()
    };

    tracing_subscriber::registry()
        .with(format)
        .with(env_filter)
        .try_init()
        .ok();
}
