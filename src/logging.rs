//! Logging setup helpers
//!
//! Thin wrappers over tracing-subscriber so hosting applications get
//! consistent output with RUST_LOG-style filtering. Safe to call more
//! than once; later calls are no-ops.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize console logging
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init();
}

/// Initialize JSON logging to a daily-rotated file.
///
/// The returned guard must be held for the lifetime of the application;
/// dropping it flushes and stops the background writer.
pub fn init_with_file(dir: impl AsRef<Path>, file_prefix: &str) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(dir, file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
