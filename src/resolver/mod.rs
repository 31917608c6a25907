//! Server discovery.
//!
//! Finding a runnable `hx-requests-lsp` in a loosely specified
//! environment is the one genuinely branchy part of this client. The
//! policy is an ordered list of strategies, tried in sequence; the first
//! one that produces an [`InvocationPlan`] wins and later strategies are
//! not consulted:
//!
//! 1. explicit `serverPath` from the settings
//! 2. the copy bundled with the client installation
//! 3. a virtual environment inside one of the workspace roots
//! 4. a Python interpreter that can import the server module
//! 5. the system `PATH`
//!
//! Each call to [`Resolver::resolve`] is independent; nothing is cached
//! between restarts.

mod interpreter;
mod probe;
mod strategies;

pub use interpreter::{resolve_interpreter, InterpreterProvider, NoInterpreterProvider};
pub use probe::{find_in_path, module_importable};

use crate::config::Settings;
use crate::events::EventSink;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Flag selecting standard-stream transport, understood by both the
/// standalone executable and the module entry point.
pub const STDIO_FLAG: &str = "--stdio";

/// Module executed for interpreter-hosted launches
/// (`python -m hx_requests_lsp.server --stdio`).
pub const SERVER_MODULE: &str = "hx_requests_lsp.server";

/// Importable package name, used by the import probe and as the bundled
/// directory name.
pub const SERVER_PACKAGE: &str = "hx_requests_lsp";

/// Conventional name of the standalone server executable.
pub fn server_executable_name() -> &'static str {
    if cfg!(windows) {
        "hx-requests-lsp.exe"
    } else {
        "hx-requests-lsp"
    }
}

/// Directory names probed for a project-local virtual environment.
pub(crate) const VENV_DIR_NAMES: [&str; 2] = [".venv", "venv"];

/// Candidate locations of a named program inside the virtual
/// environments of `root`. Both POSIX (`bin/`) and Windows (`Scripts/`)
/// layouts are probed regardless of host platform; a workspace checked
/// out over a network share may carry either.
pub(crate) fn venv_candidates(root: &Path, posix_name: &str, windows_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(VENV_DIR_NAMES.len() * 2);
    for venv in VENV_DIR_NAMES {
        candidates.push(root.join(venv).join("bin").join(posix_name));
        candidates.push(root.join(venv).join("Scripts").join(windows_name));
    }
    candidates
}

/// A fully determined way to launch the server. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPlan {
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl InvocationPlan {
    /// Plan for a standalone server executable: run it directly with the
    /// stdio transport flag, no interpreter indirection.
    pub fn standalone(command: PathBuf) -> Self {
        Self {
            command,
            args: vec![STDIO_FLAG.to_string()],
            env: Vec::new(),
        }
    }

    /// Plan for an interpreter-hosted launch of the server module.
    pub fn module_hosted(python: PathBuf) -> Self {
        Self {
            command: python,
            args: vec![
                "-m".to_string(),
                SERVER_MODULE.to_string(),
                STDIO_FLAG.to_string(),
            ],
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: String) -> Self {
        self.env.push((key.to_string(), value));
        self
    }
}

impl fmt::Display for InvocationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.command.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Returned when every strategy came up empty.
#[derive(Debug, thiserror::Error)]
#[error("no runnable hx-requests language server was found")]
pub struct NotFound;

/// Everything a strategy may consult.
pub struct ResolveContext<'a> {
    pub settings: &'a Settings,
    pub roots: &'a [PathBuf],
    pub provider: &'a dyn InterpreterProvider,
    /// Client installation directory, parent of the bundled server copy.
    pub install_dir: &'a Path,
    pub sink: &'a EventSink,
}

/// One discovery strategy. Returning `None` means "skip to the next
/// strategy", never a hard failure.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn try_resolve(&self, cx: &ResolveContext<'_>) -> Option<InvocationPlan>;
}

/// The ordered-fallback resolver. Owns no state beyond the installation
/// directory used by the bundled-copy strategy.
pub struct Resolver {
    install_dir: PathBuf,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl Resolver {
    pub fn new(install_dir: PathBuf) -> Self {
        Self {
            install_dir,
            strategies: strategies::default_order(),
        }
    }

    /// Resolver rooted at the running executable's directory, the normal
    /// production configuration.
    pub fn for_current_exe() -> Self {
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(install_dir)
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Try every strategy in order and short-circuit on the first plan.
    pub async fn resolve(
        &self,
        settings: &Settings,
        roots: &[PathBuf],
        provider: &dyn InterpreterProvider,
        sink: &EventSink,
    ) -> Result<InvocationPlan, NotFound> {
        let cx = ResolveContext {
            settings,
            roots,
            provider,
            install_dir: &self.install_dir,
            sink,
        };

        for strategy in &self.strategies {
            if let Some(plan) = strategy.try_resolve(&cx).await {
                sink.resolution(format!("Found server via {}: {}", strategy.name(), plan));
                return Ok(plan);
            }
            tracing::debug!("Strategy '{}' did not match", strategy.name());
        }

        Err(NotFound)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write an executable stub and return it together with its tempdir
    /// (dropping the tempdir deletes the stub).
    pub fn fake_executable(name: &str, contents: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        (dir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_plan_carries_only_the_stdio_flag() {
        let plan = InvocationPlan::standalone(PathBuf::from("/x/y"));
        assert_eq!(plan.command, PathBuf::from("/x/y"));
        assert_eq!(plan.args, vec!["--stdio"]);
        assert!(plan.env.is_empty());
    }

    #[test]
    fn module_plan_uses_module_execution_semantics() {
        let plan = InvocationPlan::module_hosted(PathBuf::from("/usr/bin/python3"));
        assert_eq!(plan.args, vec!["-m", "hx_requests_lsp.server", "--stdio"]);
    }

    #[test]
    fn display_includes_env_and_args() {
        let plan = InvocationPlan::module_hosted(PathBuf::from("/usr/bin/python3"))
            .with_env("PYTHONPATH", "/ext/bundled/libs".to_string());
        assert_eq!(
            plan.to_string(),
            "PYTHONPATH=/ext/bundled/libs /usr/bin/python3 -m hx_requests_lsp.server --stdio"
        );
    }

    #[test]
    fn venv_candidates_probe_both_layouts_in_order() {
        let got = venv_candidates(Path::new("/proj"), "hx-requests-lsp", "hx-requests-lsp.exe");
        let want: Vec<PathBuf> = [
            "/proj/.venv/bin/hx-requests-lsp",
            "/proj/.venv/Scripts/hx-requests-lsp.exe",
            "/proj/venv/bin/hx-requests-lsp",
            "/proj/venv/Scripts/hx-requests-lsp.exe",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(got, want);
    }
}
