//! Tracing subscriber setup
//!
//! Shared between the binary and tests. Logs go to a file when one is
//! configured and to stderr otherwise; stdout stays reserved for the
//! event stream.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber. Environment-based filtering
/// (`RUST_LOG`) applies on top of an INFO default.
pub fn init_global(log_file_path: Option<&Path>) -> anyhow::Result<()> {
    match log_file_path {
        Some(path) => {
            let log_file = File::create(path)?;
            build_subscriber(log_file).init();
        }
        None => {
            build_stderr_subscriber().init();
        }
    }
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

/// File-backed subscriber, also used by tests that inspect log output.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer().with_writer(Arc::new(log_file)).with_ansi(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter())
}

fn build_stderr_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer().with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn file_subscriber_records_info_events() {
        let log_file = NamedTempFile::new().unwrap();
        let subscriber = build_subscriber(log_file.reopen().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("session state changed");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("INFO"));
        assert!(contents.contains("session state changed"));
    }
}
