//! The user-visible event channel.
//!
//! Everything the client decides or observes is reported here:
//! discovery decisions, lifecycle transitions, errors, server
//! diagnostics, and raw protocol traffic when tracing is enabled. The
//! host (an
//! editor, or the `hx-lsp` binary) drains the receiver and renders the
//! events however it likes; this crate never prints to the terminal
//! itself.

use crate::session::LifecycleState;
use tokio::sync::mpsc;

/// A single entry on the client's output channel.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A lifecycle transition of the session.
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// A server discovery decision (which strategy matched, what was
    /// skipped and why).
    Resolution(String),

    /// Raw protocol traffic, emitted only when `trace` is not `off`.
    Trace(String),

    /// Diagnostics published by the server for a document.
    Diagnostics {
        uri: String,
        diagnostics: Vec<lsp_types::Diagnostic>,
    },

    /// A `window/logMessage` or stderr line from the server process.
    ServerMessage(String),

    /// A user-visible failure. `remediation` names the concrete fix
    /// (what to install or configure) when one is known.
    Error {
        message: String,
        remediation: Option<String>,
    },
}

/// Sending half of the event channel. Cheap to clone; every component
/// that makes a reportable decision holds one.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

/// Create a connected sink/receiver pair.
pub fn channel() -> (EventSink, mpsc::UnboundedReceiver<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Emit an event. Never blocks; a dropped receiver is not an error
    /// (the host may simply not care about the channel).
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    pub fn resolution(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.emit(ClientEvent::Resolution(message));
    }

    pub fn trace(&self, line: impl Into<String>) {
        self.emit(ClientEvent::Trace(line.into()));
    }

    pub fn error(&self, message: impl Into<String>, remediation: Option<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.emit(ClientEvent::Error {
            message,
            remediation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_after_receiver_dropped_is_not_an_error() {
        let (sink, rx) = channel();
        drop(rx);
        sink.resolution("still fine");
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut rx) = channel();
        sink.resolution("first");
        sink.error("second", Some("fix it".to_string()));

        match rx.recv().await {
            Some(ClientEvent::Resolution(m)) => assert_eq!(m, "first"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await {
            Some(ClientEvent::Error { remediation, .. }) => {
                assert_eq!(remediation.as_deref(), Some("fix it"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
