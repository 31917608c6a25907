//! Editor-side client for the hx-requests language server.
//!
//! This crate locates, launches, and supervises the `hx-requests-lsp`
//! server process (completion, go-to-definition, references, diagnostics
//! and hover for Django templates using the hx-requests library).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SessionManager                                          │
//! │  - owns the single live session                          │
//! │  - start / stop / restart, serialized                    │
//! │  - Stopped → Starting → Running → Stopping → Stopped     │
//! └───────────┬──────────────────────────┬───────────────────┘
//!             │                          │
//!             ▼                          ▼
//! ┌───────────────────────┐  ┌──────────────────────────────┐
//! │  Resolver             │  │  ServerHandle (transport)    │
//! │  ordered strategies:  │  │  - tokio task owns the child │
//! │  1. explicit path     │  │  - stdio JSON-RPC framing    │
//! │  2. bundled copy      │  │  - initialize handshake      │
//! │  3. workspace venv    │  │  - graceful shutdown         │
//! │  4. python module     │  └──────────────────────────────┘
//! │  5. system PATH       │
//! └───────────────────────┘
//! ```
//!
//! The resolver is a pure function of the settings snapshot and workspace
//! roots (plus filesystem probes); the session manager is the only writer
//! of lifecycle state. Every discovery decision and lifecycle transition
//! is reported on the [`events::ClientEvent`] channel, which is the
//! user-visible output channel of the client.

pub mod config;
pub mod events;
pub mod resolver;
pub mod session;
pub mod tracing_setup;
pub mod transport;
pub mod watch;

pub use config::{Settings, TraceLevel};
pub use events::{ClientEvent, EventSink};
pub use resolver::{InterpreterProvider, InvocationPlan, Resolver};
pub use session::{LifecycleState, SessionError, SessionManager};
