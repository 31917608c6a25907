//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

/// Write an executable stub into a fresh tempdir. Dropping the tempdir
/// deletes the stub.
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

/// A stand-in language server: answers the `initialize` request with an
/// empty capability set, then swallows its input until EOF.
#[cfg(unix)]
pub fn fake_server() -> (TempDir, PathBuf) {
    let body = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;
    let script = format!(
        "#!/bin/sh\nprintf 'Content-Length: {}\\r\\n\\r\\n%s' '{}'\ncat >/dev/null\n",
        body.len(),
        body
    );
    fake_executable("fake-hx-requests-lsp", &script)
}

/// A stand-in server that never answers anything.
#[cfg(unix)]
pub fn silent_server() -> (TempDir, PathBuf) {
    fake_executable("silent-hx-requests-lsp", "#!/bin/sh\ncat >/dev/null\n")
}
