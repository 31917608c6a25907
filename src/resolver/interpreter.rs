//! Python interpreter selection for interpreter-hosted launches.

use crate::config::Settings;
use std::path::{Path, PathBuf};

use super::venv_candidates;

/// Narrow capability interface over a host-provided interpreter
/// management integration (the Python extension of the editor, when one
/// is installed). Absence and errors are both modeled as `None`; the
/// collaborator is optional by design.
pub trait InterpreterProvider: Send + Sync {
    /// The integration's currently configured interpreter for a
    /// workspace root, if it knows one.
    fn preferred_interpreter(&self, root: &Path) -> Option<PathBuf>;
}

/// Provider used when no integration is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterpreterProvider;

impl InterpreterProvider for NoInterpreterProvider {
    fn preferred_interpreter(&self, _root: &Path) -> Option<PathBuf> {
        None
    }
}

fn bare_interpreter_name() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Pick the interpreter used by the bundled-copy and module-hosted
/// strategies. This never fails: the final fallback is the bare
/// conventional interpreter name, deferring to whatever `PATH` resolves
/// at launch time. Callers that need a working interpreter (the import
/// probe) verify it themselves.
pub fn resolve_interpreter(
    settings: &Settings,
    roots: &[PathBuf],
    provider: &dyn InterpreterProvider,
) -> PathBuf {
    if let Some(configured) = &settings.python_path {
        if configured.exists() {
            tracing::debug!("Using configured pythonPath {:?}", configured);
            return configured.clone();
        }
        tracing::warn!(
            "Configured pythonPath {:?} does not exist, falling back to discovery",
            configured
        );
    }

    if let Some(root) = roots.first() {
        if let Some(path) = provider.preferred_interpreter(root) {
            tracing::debug!("Using interpreter {:?} from host integration", path);
            return path;
        }
        tracing::debug!("Host interpreter integration returned nothing");
    }

    let python = if cfg!(windows) { "python.exe" } else { "python" };
    for root in roots {
        for candidate in venv_candidates(root, python, "python.exe") {
            if candidate.exists() {
                tracing::debug!("Using venv interpreter {:?}", candidate);
                return candidate;
            }
        }
    }

    PathBuf::from(bare_interpreter_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FixedProvider(PathBuf);

    impl InterpreterProvider for FixedProvider {
        fn preferred_interpreter(&self, _root: &Path) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn configured_python_path_wins_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let python = dir.path().join("python");
        fs::write(&python, "").unwrap();

        let settings = Settings {
            python_path: Some(python.clone()),
            ..Settings::default()
        };
        let got = resolve_interpreter(
            &settings,
            &[dir.path().to_path_buf()],
            &FixedProvider(PathBuf::from("/elsewhere/python")),
        );
        assert_eq!(got, python);
    }

    #[test]
    fn absent_configured_path_falls_through_to_provider() {
        let settings = Settings {
            python_path: Some(PathBuf::from("/does/not/exist/python")),
            ..Settings::default()
        };
        let got = resolve_interpreter(
            &settings,
            &[PathBuf::from("/proj")],
            &FixedProvider(PathBuf::from("/provider/python")),
        );
        assert_eq!(got, PathBuf::from("/provider/python"));
    }

    #[test]
    fn venv_interpreter_found_before_bare_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join(".venv").join("bin");
        fs::create_dir_all(&bin).unwrap();
        let python = bin.join("python");
        fs::write(&python, "").unwrap();

        let got = resolve_interpreter(
            &Settings::default(),
            &[dir.path().to_path_buf()],
            &NoInterpreterProvider,
        );
        assert_eq!(got, python);
    }

    #[test]
    fn fallback_is_the_bare_interpreter_name() {
        let dir = tempfile::tempdir().unwrap();
        let got = resolve_interpreter(
            &Settings::default(),
            &[dir.path().to_path_buf()],
            &NoInterpreterProvider,
        );
        let want = if cfg!(windows) { "python" } else { "python3" };
        assert_eq!(got, PathBuf::from(want));
    }
}
