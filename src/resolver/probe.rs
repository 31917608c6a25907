//! Side-effecting discovery probes: the subprocess import check and the
//! system PATH scan.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Bound on the throwaway import-check subprocess. Discovery runs on the
/// host's event loop; a wedged interpreter must not stall it.
pub const IMPORT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Check whether `python` can import `module` by running it in a
/// throwaway subprocess. Any failure (non-zero exit, spawn error, or
/// timeout) uniformly means "not importable"; the caller only needs a
/// boolean and sub-causes are not distinguished.
pub async fn module_importable(python: &Path, module: &str) -> bool {
    let child = Command::new(python)
        .arg("-c")
        .arg(format!("import {}", module))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(IMPORT_PROBE_TIMEOUT, child).await {
        Ok(Ok(output)) => output.status.success(),
        Ok(Err(err)) => {
            tracing::debug!("Import probe failed to run {:?}: {}", python, err);
            false
        }
        Err(_) => {
            tracing::debug!("Import probe timed out for {:?}", python);
            false
        }
    }
}

/// First match for `name` on the system executable search path.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    find_in_path_value(name, std::env::var_os("PATH")?.as_os_str())
}

/// PATH scan against an explicit search-path value, split out so tests
/// do not have to mutate the process environment.
pub fn find_in_path_value(name: &str, path_value: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_value)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn find_in_path_value_returns_first_match() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("hx-requests-lsp"), "").unwrap();
        fs::write(second.path().join("hx-requests-lsp"), "").unwrap();

        let joined =
            std::env::join_paths([first.path(), second.path()]).unwrap();
        let got = find_in_path_value("hx-requests-lsp", &joined).unwrap();
        assert_eq!(got, first.path().join("hx-requests-lsp"));
    }

    #[test]
    fn find_in_path_value_ignores_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("hx-requests-lsp")).unwrap();

        let joined = std::env::join_paths([dir.path()]).unwrap();
        assert!(find_in_path_value("hx-requests-lsp", &joined).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_trusts_a_zero_exit() {
        let script = crate::resolver::tests_support::fake_executable(
            "python-ok",
            "#!/bin/sh\nexit 0\n",
        );
        assert!(module_importable(&script.1, "hx_requests_lsp").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_treats_nonzero_exit_as_not_importable() {
        let script = crate::resolver::tests_support::fake_executable(
            "python-err",
            "#!/bin/sh\nexit 1\n",
        );
        assert!(!module_importable(&script.1, "hx_requests_lsp").await);
    }

    #[tokio::test]
    async fn probe_treats_spawn_failure_as_not_importable() {
        assert!(!module_importable(Path::new("/no/such/python"), "hx_requests_lsp").await);
    }
}
