//! The ordered discovery strategies.
//!
//! Order matters and is fixed: explicit setting, bundled copy, workspace
//! venv, importable module, system PATH. The bundled copy outranks
//! everything except an explicit `serverPath` so that the client works
//! out of the box while still letting power users override it.

use async_trait::async_trait;

use super::interpreter::resolve_interpreter;
use super::probe::{find_in_path, module_importable};
use super::{
    server_executable_name, venv_candidates, InvocationPlan, ResolveContext, ResolveStrategy,
    SERVER_PACKAGE,
};

pub(super) fn default_order() -> Vec<Box<dyn ResolveStrategy>> {
    vec![
        Box::new(ExplicitPath),
        Box::new(BundledCopy),
        Box::new(WorkspaceVenv),
        Box::new(ImportableModule),
        Box::new(SystemPath),
    ]
}

/// Strategy 1: the `serverPath` setting, taken as a standalone
/// executable. A configured-but-absent path is logged and skipped rather
/// than failing the whole resolution.
struct ExplicitPath;

#[async_trait]
impl ResolveStrategy for ExplicitPath {
    fn name(&self) -> &'static str {
        "explicit serverPath"
    }

    async fn try_resolve(&self, cx: &ResolveContext<'_>) -> Option<InvocationPlan> {
        let configured = cx.settings.server_path.as_ref()?;
        if configured.exists() {
            return Some(InvocationPlan::standalone(configured.clone()));
        }
        cx.sink.resolution(format!(
            "Configured serverPath {:?} does not exist, trying other locations",
            configured
        ));
        None
    }
}

/// Strategy 2: the server copy shipped inside the client installation,
/// run through an interpreter with the bundled directory prepended to
/// the module search path.
struct BundledCopy;

#[async_trait]
impl ResolveStrategy for BundledCopy {
    fn name(&self) -> &'static str {
        "bundled server"
    }

    async fn try_resolve(&self, cx: &ResolveContext<'_>) -> Option<InvocationPlan> {
        let bundled_libs = cx.install_dir.join("bundled").join("libs");
        if !bundled_libs.join(SERVER_PACKAGE).exists() {
            return None;
        }
        let python = resolve_interpreter(cx.settings, cx.roots, cx.provider);
        Some(
            InvocationPlan::module_hosted(python)
                .with_env("PYTHONPATH", bundled_libs.display().to_string()),
        )
    }
}

/// Strategy 3: a server executable inside a conventional virtual
/// environment of one of the workspace roots. Root order is the outer
/// loop, so the first root with any match wins even when a later root
/// has a "better" layout.
struct WorkspaceVenv;

#[async_trait]
impl ResolveStrategy for WorkspaceVenv {
    fn name(&self) -> &'static str {
        "workspace venv"
    }

    async fn try_resolve(&self, cx: &ResolveContext<'_>) -> Option<InvocationPlan> {
        for root in cx.roots {
            for candidate in venv_candidates(root, "hx-requests-lsp", "hx-requests-lsp.exe") {
                if candidate.exists() {
                    return Some(InvocationPlan::standalone(candidate));
                }
            }
        }
        None
    }
}

/// Strategy 4: an interpreter that already has the server module
/// installed. The interpreter itself always resolves to something; the
/// import probe is the actual gate.
struct ImportableModule;

#[async_trait]
impl ResolveStrategy for ImportableModule {
    fn name(&self) -> &'static str {
        "python module"
    }

    async fn try_resolve(&self, cx: &ResolveContext<'_>) -> Option<InvocationPlan> {
        let python = resolve_interpreter(cx.settings, cx.roots, cx.provider);
        if module_importable(&python, SERVER_PACKAGE).await {
            Some(InvocationPlan::module_hosted(python))
        } else {
            None
        }
    }
}

/// Strategy 5: the conventional executable name on the system PATH.
struct SystemPath;

#[async_trait]
impl ResolveStrategy for SystemPath {
    fn name(&self) -> &'static str {
        "system PATH"
    }

    async fn try_resolve(&self, _cx: &ResolveContext<'_>) -> Option<InvocationPlan> {
        find_in_path(server_executable_name()).map(InvocationPlan::standalone)
    }
}
