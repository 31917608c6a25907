//! Client settings.
//!
//! The settings snapshot is immutable once loaded; the session manager
//! re-reads it on every (re)start so configuration edits take effect on
//! the next restart without any cache invalidation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How much protocol traffic to mirror onto the output channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    Off,
    Messages,
    Verbose,
}

/// A snapshot of the recognized client options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Whether the client should run at all. When false, `start` is a
    /// logged no-op.
    pub enabled: bool,

    /// Explicit path to a standalone `hx-requests-lsp` executable.
    /// Takes priority over every other discovery strategy.
    pub server_path: Option<PathBuf>,

    /// Explicit path to the Python interpreter used for
    /// interpreter-hosted launches.
    pub python_path: Option<PathBuf>,

    /// Protocol trace level for the output channel.
    pub trace: TraceLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            server_path: None,
            python_path: None,
            trace: TraceLevel::Off,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// A missing file yields the defaults; a present-but-invalid file is
    /// an error (the user asked for that file, silently ignoring it
    /// would hide typos).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        Ok(settings)
    }
}
