//! Lifecycle tests against stand-in server processes.

mod common;

use hx_lsp::config::Settings;
use hx_lsp::events::{self, ClientEvent};
use hx_lsp::resolver::{NoInterpreterProvider, Resolver};
use hx_lsp::session::{LifecycleState, SessionError, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn manager_for(
    settings: Settings,
    roots: Vec<PathBuf>,
) -> (SessionManager, UnboundedReceiver<ClientEvent>) {
    let (sink, rx) = events::channel();
    let install_dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(
        roots,
        Resolver::new(install_dir.path().to_path_buf()),
        Arc::new(NoInterpreterProvider),
        Box::new(move || settings.clone()),
        sink,
    )
    .with_handshake_timeout(Duration::from_secs(2))
    .with_shutdown_grace(Duration::from_millis(500));
    (manager, rx)
}

fn drain_transitions(rx: &mut UnboundedReceiver<ClientEvent>) -> Vec<(LifecycleState, LifecycleState)> {
    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::StateChanged { from, to } = event {
            transitions.push((from, to));
        }
    }
    transitions
}

#[tokio::test]
async fn disabled_client_does_not_start() {
    let settings = Settings {
        enabled: false,
        ..Settings::default()
    };
    let (mut manager, mut rx) = manager_for(settings, vec![]);

    manager.start().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert!(drain_transitions(&mut rx).is_empty());
}

#[tokio::test]
async fn unresolvable_server_reports_remediation_and_stays_stopped() {
    let root = tempfile::tempdir().unwrap();
    let (mut manager, mut rx) =
        manager_for(Settings::default(), vec![root.path().to_path_buf()]);

    let result = manager.start().await;

    assert!(matches!(result, Err(SessionError::NotFound)));
    assert_eq!(manager.state(), LifecycleState::Stopped);

    let mut saw_remediation = false;
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::Error { remediation, .. } = event {
            let hint = remediation.expect("discovery failure carries a remediation");
            assert!(hint.contains("pip install hx-requests-lsp"));
            assert!(hint.contains("serverPath"));
            saw_remediation = true;
        }
    }
    assert!(saw_remediation);
}

#[tokio::test]
async fn discovery_failure_emits_no_lifecycle_transitions() {
    let root = tempfile::tempdir().unwrap();
    let (mut manager, mut rx) =
        manager_for(Settings::default(), vec![root.path().to_path_buf()]);

    let result = manager.start().await;

    assert!(matches!(result, Err(SessionError::NotFound)));
    // Discovery runs while still Stopped; the channel must carry no
    // Stopped -> Starting -> Stopped round trip.
    assert!(drain_transitions(&mut rx).is_empty());
}

#[tokio::test]
async fn stop_when_stopped_is_a_silent_no_op() {
    let (mut manager, mut rx) = manager_for(Settings::default(), vec![]);

    manager.stop().await;

    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert!(drain_transitions(&mut rx).is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn full_lifecycle_against_a_fake_server() {
    let (_server_dir, server) = common::fake_server();
    let settings = Settings {
        server_path: Some(server),
        ..Settings::default()
    };
    let (mut manager, mut rx) = manager_for(settings, vec![]);

    manager.start().await.unwrap();
    assert!(manager.is_running());
    assert!(manager.initialize_result().is_some());

    manager.stop().await;
    assert_eq!(manager.state(), LifecycleState::Stopped);
    assert!(manager.initialize_result().is_none());

    let transitions = drain_transitions(&mut rx);
    assert_eq!(
        transitions,
        vec![
            (LifecycleState::Stopped, LifecycleState::Starting),
            (LifecycleState::Starting, LifecycleState::Running),
            (LifecycleState::Running, LifecycleState::Stopping),
            (LifecycleState::Stopping, LifecycleState::Stopped),
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn restart_stops_before_starting_again() {
    let (_server_dir, server) = common::fake_server();
    let settings = Settings {
        server_path: Some(server),
        ..Settings::default()
    };
    let (mut manager, mut rx) = manager_for(settings, vec![]);

    manager.start().await.unwrap();
    manager.restart().await.unwrap();
    assert!(manager.is_running());

    let transitions = drain_transitions(&mut rx);
    assert_eq!(
        transitions,
        vec![
            (LifecycleState::Stopped, LifecycleState::Starting),
            (LifecycleState::Starting, LifecycleState::Running),
            (LifecycleState::Running, LifecycleState::Stopping),
            (LifecycleState::Stopping, LifecycleState::Stopped),
            (LifecycleState::Stopped, LifecycleState::Starting),
            (LifecycleState::Starting, LifecycleState::Running),
        ]
    );

    manager.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn handshake_failure_ends_stopped_with_an_error_event() {
    let (_server_dir, server) = common::silent_server();
    let settings = Settings {
        server_path: Some(server),
        ..Settings::default()
    };
    let (manager, mut rx) = manager_for(settings, vec![]);
    // Tight handshake bound so the test does not sit out the default.
    let mut manager = manager.with_handshake_timeout(Duration::from_millis(200));

    let result = manager.start().await;

    assert!(matches!(result, Err(SessionError::HandshakeFailed(_))));
    assert_eq!(manager.state(), LifecycleState::Stopped);

    let saw_error = {
        let mut saw = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ClientEvent::Error { .. }) {
                saw = true;
            }
        }
        saw
    };
    assert!(saw_error);
}

#[cfg(unix)]
#[tokio::test]
async fn start_while_running_replaces_the_session() {
    let (_server_dir, server) = common::fake_server();
    let settings = Settings {
        server_path: Some(server),
        ..Settings::default()
    };
    let (mut manager, mut rx) = manager_for(settings, vec![]);

    manager.start().await.unwrap();
    manager.start().await.unwrap();
    assert!(manager.is_running());

    // The second start went through a full stop first.
    let transitions = drain_transitions(&mut rx);
    assert!(transitions
        .contains(&(LifecycleState::Running, LifecycleState::Stopping)));

    manager.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn document_notifications_are_dropped_when_not_running() {
    let (manager, mut rx) = manager_for(Settings::default(), vec![]);

    manager.document_opened(std::path::Path::new("/proj/hx_requests.py"), String::new());
    manager.files_changed(vec![]);

    assert!(drain_transitions(&mut rx).is_empty());
}
