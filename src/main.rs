use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use hx_lsp::config::Settings;
use hx_lsp::events::ClientEvent;
use hx_lsp::resolver::{NoInterpreterProvider, Resolver};
use hx_lsp::session::SessionManager;
use hx_lsp::tracing_setup;
use hx_lsp::watch::WorkspaceWatcher;
use std::path::PathBuf;
use std::sync::Arc;

/// Editor-side client for the hx-requests language server
#[derive(Parser, Debug)]
#[command(name = "hx-lsp")]
#[command(about = "Locate, launch, and supervise the hx-requests language server", long_about = None)]
#[command(version)]
struct Args {
    /// Workspace root directories, in priority order
    #[arg(value_name = "ROOTS")]
    roots: Vec<PathBuf>,

    /// Path to the settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file for client diagnostics (default: stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let args = Args::parse();
    tracing_setup::init_global(args.log_file.as_deref())
        .context("failed to initialize logging")?;

    let roots: Vec<PathBuf> = if args.roots.is_empty() {
        vec![std::env::current_dir().context("cannot determine working directory")?]
    } else {
        args.roots
            .iter()
            .map(|r| r.canonicalize().unwrap_or_else(|_| r.clone()))
            .collect()
    };

    let config_path = args.config.clone();
    let load_settings = Box::new(move || match &config_path {
        Some(path) => Settings::load(path).unwrap_or_else(|err| {
            tracing::warn!("Ignoring invalid settings file: {}", err);
            Settings::default()
        }),
        None => Settings::default(),
    });

    let (sink, mut events) = hx_lsp::events::channel();
    let drain = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut watcher = WorkspaceWatcher::spawn(&roots).unwrap_or_else(|err| {
        tracing::warn!("File watching unavailable: {}", err);
        WorkspaceWatcher::disabled()
    });

    let mut manager = SessionManager::new(
        roots,
        Resolver::for_current_exe(),
        Arc::new(NoInterpreterProvider),
        load_settings,
        sink,
    );

    if let Err(err) = manager.start().await {
        tracing::error!("Initial start failed: {}", err);
    }

    run_event_loop(&mut manager, &mut watcher).await;

    manager.stop().await;
    drop(manager);
    let _ = drain.await;
    Ok(())
}

/// Drive the session until termination. Ctrl-C (and SIGTERM on Unix)
/// ends the loop, SIGHUP restarts the server session, and watched-file
/// changes are forwarded to the running session.
async fn run_event_loop(manager: &mut SessionManager, watcher: &mut WorkspaceWatcher) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("Cannot listen for SIGHUP: {}", err);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", err);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = terminate.recv() => break,
                _ = hangup.recv() => {
                    if let Err(err) = manager.restart().await {
                        tracing::error!("Restart failed: {}", err);
                    }
                }
                Some(changes) = watcher.next_changes() => {
                    manager.files_changed(changes);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                Some(changes) = watcher.next_changes() => {
                    manager.files_changed(changes);
                }
            }
        }
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::StateChanged { from, to } => println!("state: {} -> {}", from, to),
        ClientEvent::Resolution(message) => println!("resolve: {}", message),
        ClientEvent::Trace(message) => println!("trace: {}", message),
        ClientEvent::ServerMessage(message) => println!("server: {}", message),
        ClientEvent::Diagnostics { uri, diagnostics } => {
            println!("diagnostics: {} ({})", uri, diagnostics.len());
        }
        ClientEvent::Error {
            message,
            remediation,
        } => match remediation {
            Some(hint) => println!("error: {} ({})", message, hint),
            None => println!("error: {}", message),
        },
    }
}
