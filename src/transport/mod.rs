//! The LSP transport: an async task that owns the server child process
//! and speaks `Content-Length`-framed JSON-RPC over its stdio.
//!
//! [`ServerHandle`] is the only way to talk to the task; the child's
//! stream pair is owned exclusively by the task for the session's
//! lifetime. The task processes commands sequentially; a separate reader
//! task routes responses to their pending requests and forwards server
//! notifications to the event channel.

pub mod jsonrpc;

use crate::config::TraceLevel;
use crate::events::{ClientEvent, EventSink};
use crate::resolver::InvocationPlan;
use crate::watch;
use jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use lsp_types::notification::{
    DidChangeWatchedFiles, DidOpenTextDocument, Exit, Initialized, Notification,
    PublishDiagnostics,
};
use lsp_types::request::{Initialize, Request, Shutdown};
use lsp_types::{
    ClientCapabilities, ClientInfo, DidChangeWatchedFilesParams, DidOpenTextDocumentParams,
    FileChangeType, FileEvent, InitializeParams, InitializeResult, InitializedParams,
    PublishDiagnosticsParams, TextDocumentItem, TraceValue, WorkspaceFolder,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn language server: {0}")]
    Spawn(std::io::Error),
    #[error("server stream error: {0}")]
    Io(std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("server returned an error: {0}")]
    Server(String),
    #[error("timed out waiting for the server")]
    Timeout,
    #[error("server connection closed")]
    Closed,
}

/// Convert a filesystem path to an LSP document URI.
pub fn uri_for_path(path: &Path) -> Option<lsp_types::Uri> {
    url::Url::from_file_path(path)
        .ok()
        .and_then(|u| u.as_str().parse().ok())
}

/// Build a watched-file change event, or `None` for paths that cannot
/// be expressed as a file URI.
pub fn watched_file_event(path: &Path, typ: FileChangeType) -> Option<FileEvent> {
    uri_for_path(path).map(|uri| FileEvent { uri, typ })
}

fn trace_value(level: TraceLevel) -> TraceValue {
    match level {
        TraceLevel::Off => TraceValue::Off,
        TraceLevel::Messages => TraceValue::Messages,
        TraceLevel::Verbose => TraceValue::Verbose,
    }
}

/// Commands sent from the session manager to the transport task.
#[derive(Debug)]
enum ServerCommand {
    Initialize {
        handshake_timeout: Duration,
        reply: oneshot::Sender<Result<InitializeResult, TransportError>>,
    },
    DidOpen {
        uri: lsp_types::Uri,
        language_id: String,
        text: String,
    },
    WatchedFiles {
        changes: Vec<FileEvent>,
    },
    Shutdown {
        grace: Duration,
        reply: oneshot::Sender<()>,
    },
}

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, TransportError>>>>>;

/// Handle to a spawned server transport. Dropping the handle closes the
/// command channel; the child is killed on task drop as a backstop.
pub struct ServerHandle {
    command_tx: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    /// Spawn the server process described by `plan` and start its
    /// transport task. Must be called inside a tokio runtime.
    pub fn spawn(
        plan: &InvocationPlan,
        root: Option<&Path>,
        trace: TraceLevel,
        sink: EventSink,
    ) -> Result<Self, TransportError> {
        tracing::info!("Spawning language server: {}", plan);

        let mut command = Command::new(&plan.command);
        command
            .args(&plan.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &plan.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(TransportError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = BufReader::new(
            child
                .stdout
                .take()
                .ok_or_else(|| TransportError::Protocol("child stdout unavailable".to_string()))?,
        );
        if let Some(stderr) = child.stderr.take() {
            let stderr_sink = sink.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("server stderr: {}", line);
                    stderr_sink.emit(ClientEvent::ServerMessage(line));
                }
            });
        }

        let (command_tx, command_rx) = mpsc::channel(64);
        let task = ServerTask {
            child,
            stdin: Some(stdin),
            next_id: 1,
            pending: Arc::new(Mutex::new(HashMap::new())),
            root: root.map(Path::to_path_buf),
            trace,
            sink,
            initialized: false,
        };
        tokio::spawn(task.run(command_rx, stdout));

        Ok(Self { command_tx })
    }

    /// Run the `initialize`/`initialized` handshake, bounded by
    /// `handshake_timeout`.
    pub async fn initialize(
        &self,
        handshake_timeout: Duration,
    ) -> Result<InitializeResult, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(ServerCommand::Initialize {
                handshake_timeout,
                reply,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        // The task enforces the timeout itself so that it stays
        // responsive to a later shutdown command; this outer bound only
        // covers a task that died outright.
        match timeout(handshake_timeout + Duration::from_secs(1), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Graceful shutdown: protocol termination handshake first, then a
    /// bounded wait for the child to exit, then a kill. Always returns;
    /// a transport that is already gone counts as stopped.
    pub async fn shutdown(&self, grace: Duration) {
        let (reply, rx) = oneshot::channel();
        if self
            .command_tx
            .send(ServerCommand::Shutdown { grace, reply })
            .await
            .is_err()
        {
            return;
        }
        // Grace applies to the protocol handshake and the child wait
        // separately; bound the overall wait accordingly.
        let _ = timeout(grace * 2 + Duration::from_secs(1), rx).await;
    }

    /// Announce an open document. Files outside the client's document
    /// scope are filtered here; returns whether the document was sent.
    pub fn did_open(&self, path: &Path, text: String) -> Result<bool, TransportError> {
        let Some(language_id) = watch::language_id_for(path) else {
            return Ok(false);
        };
        let uri = uri_for_path(path)
            .ok_or_else(|| TransportError::Protocol(format!("not a file path: {:?}", path)))?;
        self.command_tx
            .try_send(ServerCommand::DidOpen {
                uri,
                language_id: language_id.to_string(),
                text,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(true)
    }

    /// Forward filesystem change events for the watched patterns as a
    /// `workspace/didChangeWatchedFiles` notification.
    pub fn notify_watched_files(&self, changes: Vec<FileEvent>) -> Result<(), TransportError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.command_tx
            .try_send(ServerCommand::WatchedFiles { changes })
            .map_err(|_| TransportError::Closed)
    }
}

/// The async task owning the child process and its stdin.
struct ServerTask {
    child: Child,
    stdin: Option<ChildStdin>,
    next_id: i64,
    pending: Pending,
    root: Option<PathBuf>,
    trace: TraceLevel,
    sink: EventSink,
    initialized: bool,
}

impl ServerTask {
    async fn run(mut self, mut command_rx: mpsc::Receiver<ServerCommand>, stdout: BufReader<ChildStdout>) {
        tokio::spawn(read_loop(
            stdout,
            self.pending.clone(),
            self.sink.clone(),
            self.trace,
        ));

        while let Some(command) = command_rx.recv().await {
            match command {
                ServerCommand::Initialize {
                    handshake_timeout,
                    reply,
                } => {
                    let result = match timeout(handshake_timeout, self.handle_initialize()).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout),
                    };
                    let _ = reply.send(result);
                }
                ServerCommand::DidOpen {
                    uri,
                    language_id,
                    text,
                } => {
                    let params = DidOpenTextDocumentParams {
                        text_document: TextDocumentItem {
                            uri,
                            language_id,
                            version: 0,
                            text,
                        },
                    };
                    if let Err(err) = self.send_notification::<DidOpenTextDocument>(params).await {
                        tracing::warn!("didOpen failed: {}", err);
                    }
                }
                ServerCommand::WatchedFiles { changes } => {
                    let params = DidChangeWatchedFilesParams { changes };
                    if let Err(err) = self
                        .send_notification::<DidChangeWatchedFiles>(params)
                        .await
                    {
                        tracing::warn!("didChangeWatchedFiles failed: {}", err);
                    }
                }
                ServerCommand::Shutdown { grace, reply } => {
                    self.handle_shutdown(grace).await;
                    let _ = reply.send(());
                    break;
                }
            }
        }

        tracing::info!("Transport task exiting");
    }

    async fn handle_initialize(&mut self) -> Result<InitializeResult, TransportError> {
        let root_uri = self.root.as_deref().and_then(uri_for_path);
        let workspace_folders = root_uri.clone().map(|uri| {
            vec![WorkspaceFolder {
                name: self
                    .root
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "workspace".to_string()),
                uri,
            }]
        });

        #[allow(deprecated)] // root_uri: the hx-requests server reads it
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            capabilities: ClientCapabilities::default(),
            trace: Some(trace_value(self.trace)),
            workspace_folders,
            client_info: Some(ClientInfo {
                name: "hx-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };

        let result: InitializeResult =
            self.send_request(Initialize::METHOD, Some(params)).await?;
        self.send_notification::<Initialized>(InitializedParams {})
            .await?;
        self.initialized = true;
        tracing::info!("Language server handshake complete");
        Ok(result)
    }

    async fn handle_shutdown(&mut self, grace: Duration) {
        if self.initialized {
            let shutdown = self.send_request::<(), Value>(Shutdown::METHOD, None);
            if timeout(grace, shutdown).await.is_err() {
                tracing::warn!("Shutdown request not answered within {:?}", grace);
            }
            let exit = JsonRpcNotification::new(Exit::METHOD, None);
            let _ = self.write_message(&exit).await;
        }

        // Closing stdin lets well-behaved servers exit on their own.
        self.stdin.take();

        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!("Server exited with {}", status),
            Ok(Err(err)) => tracing::warn!("Failed to reap server: {}", err),
            Err(_) => {
                tracing::warn!("Server did not exit within {:?}, killing it", grace);
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }
    }

    async fn send_request<P: Serialize, R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<P>,
    ) -> Result<R, TransportError> {
        let id = self.next_id;
        self.next_id += 1;

        let params = match params {
            Some(p) => Some(serde_json::to_value(p).map_err(|e| {
                TransportError::Protocol(format!("failed to serialize params: {}", e))
            })?),
            None => None,
        };
        let request = JsonRpcRequest::new(id, method, params);
        self.trace_outgoing(method, &request);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        self.write_message(&request).await?;

        let value = rx.await.map_err(|_| TransportError::Closed)??;
        serde_json::from_value(value)
            .map_err(|e| TransportError::Protocol(format!("unexpected response shape: {}", e)))
    }

    async fn send_notification<N: Notification>(
        &mut self,
        params: N::Params,
    ) -> Result<(), TransportError> {
        let params = serde_json::to_value(params).map_err(|e| {
            TransportError::Protocol(format!("failed to serialize params: {}", e))
        })?;
        let notification = JsonRpcNotification::new(N::METHOD, Some(params));
        self.trace_outgoing(N::METHOD, &notification);
        self.write_message(&notification).await
    }

    async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let framed = jsonrpc::encode(message)?;
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        stdin
            .write_all(framed.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        stdin.flush().await.map_err(TransportError::Io)
    }

    fn trace_outgoing<T: Serialize>(&self, method: &str, message: &T) {
        match self.trace {
            TraceLevel::Off => {}
            TraceLevel::Messages => self.sink.trace(format!("--> {}", method)),
            TraceLevel::Verbose => {
                let payload = serde_json::to_string(message).unwrap_or_default();
                self.sink.trace(format!("--> {} {}", method, payload));
            }
        }
    }
}

/// Reads framed messages from the server until the stream ends, routing
/// responses to their pending requests and notifications to the sink.
async fn read_loop(
    mut stdout: BufReader<ChildStdout>,
    pending: Pending,
    sink: EventSink,
    trace: TraceLevel,
) {
    loop {
        match jsonrpc::read_message(&mut stdout).await {
            Ok(message) => dispatch(message, &pending, &sink, trace),
            Err(TransportError::Closed) => {
                tracing::info!("Server output stream closed");
                break;
            }
            Err(err) => {
                sink.error(format!("Language server stream error: {}", err), None);
                break;
            }
        }
    }

    // Requests still in flight will never be answered now.
    for (_, tx) in pending.lock().unwrap().drain() {
        let _ = tx.send(Err(TransportError::Closed));
    }
}

fn dispatch(message: JsonRpcMessage, pending: &Pending, sink: &EventSink, trace: TraceLevel) {
    match message {
        JsonRpcMessage::Response(response) => {
            trace_incoming(sink, trace, &format!("response #{}", response.id), &response);
            resolve_pending(response, pending);
        }
        JsonRpcMessage::Notification(notification) => {
            let method = notification.method.clone();
            trace_incoming(sink, trace, &method, &notification);
            handle_server_notification(notification, sink);
        }
        JsonRpcMessage::Request(request) => {
            // Server-to-client requests (workspace/configuration and the
            // like) are not part of this client's surface.
            tracing::debug!("Ignoring server request '{}'", request.method);
        }
    }
}

fn resolve_pending(response: JsonRpcResponse, pending: &Pending) {
    let Some(tx) = pending.lock().unwrap().remove(&response.id) else {
        tracing::warn!("Response for unknown request id {}", response.id);
        return;
    };
    let result = match response.error {
        Some(error) => Err(TransportError::Server(format!(
            "{} (code {})",
            error.message, error.code
        ))),
        None => Ok(response.result.unwrap_or(Value::Null)),
    };
    let _ = tx.send(result);
}

fn handle_server_notification(notification: JsonRpcNotification, sink: &EventSink) {
    match notification.method.as_str() {
        PublishDiagnostics::METHOD => {
            let Some(params) = notification.params else {
                return;
            };
            match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                Ok(params) => {
                    tracing::debug!(
                        "{} diagnostics for {}",
                        params.diagnostics.len(),
                        params.uri.as_str()
                    );
                    sink.emit(ClientEvent::Diagnostics {
                        uri: params.uri.to_string(),
                        diagnostics: params.diagnostics,
                    });
                }
                Err(err) => tracing::warn!("Malformed diagnostics: {}", err),
            }
        }
        "window/logMessage" | "window/showMessage" => {
            let message = notification
                .params
                .as_ref()
                .and_then(|p| p.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("(no message)")
                .to_string();
            tracing::info!("server: {}", message);
            sink.emit(ClientEvent::ServerMessage(message));
        }
        other => tracing::debug!("Unhandled server notification '{}'", other),
    }
}

fn trace_incoming<T: Serialize>(sink: &EventSink, trace: TraceLevel, what: &str, message: &T) {
    match trace {
        TraceLevel::Off => {}
        TraceLevel::Messages => sink.trace(format!("<-- {}", what)),
        TraceLevel::Verbose => {
            let payload = serde_json::to_string(message).unwrap_or_default();
            sink.trace(format!("<-- {} {}", what, payload));
        }
    }
}
