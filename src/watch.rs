//! Document scope and watched-file conventions for hx-requests projects,
//! plus the filesystem watcher that turns change events under the
//! workspace roots into protocol notifications.

use crate::transport::watched_file_event;
use globset::{Glob, GlobSet, GlobSetBuilder};
use lsp_types::{FileChangeType, FileEvent};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Glob patterns whose change events are forwarded to the server as
/// `workspace/didChangeWatchedFiles`. These follow the hx-requests
/// project layout: request-class definition files, request-class
/// packages, template directories and template-partial directories.
pub const WATCHED_GLOBS: [&str; 4] = [
    "**/hx_requests.py",
    "**/hx_requests/**",
    "**/templates/**",
    "**/template_partials/**",
];

/// Language identifiers the client activates for.
pub const TEMPLATE_LANGUAGE_ID: &str = "django-html";
pub const SOURCE_LANGUAGE_ID: &str = "python";

/// Return the LSP language id for a document, or `None` when the file is
/// outside the client's scope. Templates and Python sources are the only
/// file kinds the hx-requests server understands.
pub fn language_id_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("py") => Some(SOURCE_LANGUAGE_ID),
        Some("html") | Some("htm") => Some(TEMPLATE_LANGUAGE_ID),
        _ => None,
    }
}

/// The compiled watched-pattern set.
#[derive(Debug)]
pub struct WatchedSet {
    glob_set: GlobSet,
}

impl WatchedSet {
    pub fn new() -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in WATCHED_GLOBS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            glob_set: builder.build()?,
        })
    }

    /// Whether a changed path falls under one of the watched patterns.
    pub fn matches(&self, path: &Path) -> bool {
        self.glob_set.is_match(path)
    }
}

/// Map a raw filesystem event kind onto the protocol's change types.
/// Access/metadata noise carries no information the server wants.
fn change_type_for(kind: &notify::EventKind) -> Option<FileChangeType> {
    match kind {
        notify::EventKind::Create(_) => Some(FileChangeType::CREATED),
        notify::EventKind::Modify(_) => Some(FileChangeType::CHANGED),
        notify::EventKind::Remove(_) => Some(FileChangeType::DELETED),
        _ => None,
    }
}

/// Recursive watcher over the workspace roots, filtered through
/// [`WATCHED_GLOBS`]. The raw notify callback runs on its own thread and
/// only forwards into a channel; filtering and conversion happen on a
/// tokio task.
pub struct WorkspaceWatcher {
    // Dropping the watcher stops the native watches.
    _watcher: Option<RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<Vec<FileEvent>>,
}

impl WorkspaceWatcher {
    pub fn spawn(roots: &[PathBuf]) -> anyhow::Result<Self> {
        let watched = WatchedSet::new()?;
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                let event: notify::Event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!("File watcher error: {}", err);
                        continue;
                    }
                };
                let Some(typ) = change_type_for(&event.kind) else {
                    continue;
                };
                let changes: Vec<FileEvent> = event
                    .paths
                    .iter()
                    .filter(|path| watched.matches(path))
                    .filter_map(|path| watched_file_event(path, typ))
                    .collect();
                if !changes.is_empty() && tx.send(changes).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            _watcher: Some(watcher),
            rx,
        })
    }

    /// Watcher that never yields, for hosts where native watching is
    /// unavailable.
    pub fn disabled() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { _watcher: None, rx }
    }

    /// The next batch of in-scope change events. `None` once the watcher
    /// is disabled or its task has ended.
    pub async fn next_changes(&mut self) -> Option<Vec<FileEvent>> {
        self.rx.recv().await
    }
}
