//! Single-session lifecycle supervision.
//!
//! One [`SessionManager`] owns at most one live server session. All
//! lifecycle operations take `&mut self`, so starts, stops, and restarts
//! are serialized by construction; there is no way to race two
//! transitions against each other.
//!
//! State transitions (always announced on the event channel):
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!                |                                 ^
//!                +---- resolution/handshake failure +
//! ```

use crate::config::Settings;
use crate::events::{ClientEvent, EventSink};
use crate::resolver::{InterpreterProvider, Resolver};
use crate::transport::{ServerHandle, TransportError};
use lsp_types::{FileEvent, InitializeResult};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on the initialize handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default grace period for shutdown before the child is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no runnable hx-requests language server was found")]
    NotFound,
    #[error("server handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Loader for the effective settings, re-read on every start so a
/// restart picks up configuration changes.
pub type SettingsLoader = Box<dyn Fn() -> Settings + Send + Sync>;

struct Session {
    handle: ServerHandle,
    initialize_result: InitializeResult,
}

/// Owns the lifecycle of the single server session.
pub struct SessionManager {
    roots: Vec<PathBuf>,
    resolver: Resolver,
    provider: Arc<dyn InterpreterProvider>,
    load_settings: SettingsLoader,
    sink: EventSink,
    state: LifecycleState,
    session: Option<Session>,
    handshake_timeout: Duration,
    shutdown_grace: Duration,
}

impl SessionManager {
    pub fn new(
        roots: Vec<PathBuf>,
        resolver: Resolver,
        provider: Arc<dyn InterpreterProvider>,
        load_settings: SettingsLoader,
        sink: EventSink,
    ) -> Self {
        Self {
            roots,
            resolver,
            provider,
            load_settings,
            sink,
            state: LifecycleState::Stopped,
            session: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    /// Start a session. A session in any non-stopped state is stopped
    /// first, so `start` doubles as "make it so". Settings are re-read,
    /// the server is resolved, spawned, and the handshake completed
    /// before the state becomes `Running`.
    ///
    /// A disabled client is a logged no-op. Resolution and handshake
    /// failures leave the manager `Stopped` and return the error after
    /// reporting it on the event channel.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != LifecycleState::Stopped {
            self.stop().await;
        }

        let settings = (self.load_settings)();
        if !settings.enabled {
            tracing::info!("Client is disabled in settings, not starting");
            return Ok(());
        }

        // Discovery happens while still Stopped; a NotFound start must
        // not surface any lifecycle transition.
        let plan = match self
            .resolver
            .resolve(&settings, &self.roots, self.provider.as_ref(), &self.sink)
            .await
        {
            Ok(plan) => plan,
            Err(_) => {
                self.sink.error(
                    "Unable to find the hx-requests language server".to_string(),
                    Some(
                        "Install it with `pip install hx-requests-lsp` or point \
                         the serverPath setting at the executable"
                            .to_string(),
                    ),
                );
                return Err(SessionError::NotFound);
            }
        };

        self.set_state(LifecycleState::Starting);

        let handle = match ServerHandle::spawn(
            &plan,
            self.roots.first().map(PathBuf::as_path),
            settings.trace,
            self.sink.clone(),
        ) {
            Ok(handle) => handle,
            Err(err) => {
                return self.fail_start(err).await;
            }
        };

        match handle.initialize(self.handshake_timeout).await {
            Ok(initialize_result) => {
                match &initialize_result.server_info {
                    Some(info) => tracing::info!(
                        "Server ready: {} {}",
                        info.name,
                        info.version.as_deref().unwrap_or("(unversioned)")
                    ),
                    None => tracing::info!("Server ready"),
                }
                self.session = Some(Session {
                    handle,
                    initialize_result,
                });
                self.set_state(LifecycleState::Running);
                Ok(())
            }
            Err(err) => {
                // Tear the half-started child down before reporting.
                handle.shutdown(self.shutdown_grace).await;
                self.fail_start(err).await
            }
        }
    }

    async fn fail_start(&mut self, err: TransportError) -> Result<(), SessionError> {
        self.sink.error(
            format!("Language server failed to start: {}", err),
            None,
        );
        self.session = None;
        self.set_state(LifecycleState::Stopped);
        Err(SessionError::HandshakeFailed(err.to_string()))
    }

    /// Stop the session. A no-op when already stopped; otherwise runs the
    /// graceful shutdown sequence and always ends in `Stopped`.
    pub async fn stop(&mut self) {
        if self.state == LifecycleState::Stopped {
            tracing::debug!("Stop requested while already stopped");
            return;
        }

        self.set_state(LifecycleState::Stopping);
        if let Some(session) = self.session.take() {
            session.handle.shutdown(self.shutdown_grace).await;
        }
        self.set_state(LifecycleState::Stopped);
    }

    /// A full stop followed by a full start. The new session re-runs
    /// settings loading and discovery from scratch.
    pub async fn restart(&mut self) -> Result<(), SessionError> {
        tracing::info!("Restarting language server");
        self.stop().await;
        self.start().await
    }

    /// Announce an open document to a running session. Quietly ignored
    /// when no session is running or the file is out of scope.
    pub fn document_opened(&self, path: &std::path::Path, text: String) {
        let Some(session) = self.running_session() else {
            return;
        };
        match session.handle.did_open(path, text) {
            Ok(true) => tracing::debug!("Opened {:?}", path),
            Ok(false) => tracing::debug!("Not a tracked document: {:?}", path),
            Err(err) => tracing::warn!("didOpen failed: {}", err),
        }
    }

    /// Forward watched-file change events to a running session.
    pub fn files_changed(&self, changes: Vec<FileEvent>) {
        let Some(session) = self.running_session() else {
            return;
        };
        if let Err(err) = session.handle.notify_watched_files(changes) {
            tracing::warn!("didChangeWatchedFiles failed: {}", err);
        }
    }

    /// The capabilities and server info negotiated during the handshake,
    /// while a session is running.
    pub fn initialize_result(&self) -> Option<&InitializeResult> {
        self.running_session().map(|s| &s.initialize_result)
    }

    fn running_session(&self) -> Option<&Session> {
        if self.state == LifecycleState::Running {
            self.session.as_ref()
        } else {
            None
        }
    }

    fn set_state(&mut self, to: LifecycleState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!("Session state: {} -> {}", from, to);
        self.sink.emit(ClientEvent::StateChanged { from, to });
    }
}
