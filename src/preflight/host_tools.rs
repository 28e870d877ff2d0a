//! Host tool availability checks.

use super::types::CheckResult;

/// Tools the pipeline shells out to: (tool, package, purpose).
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("dnf", "dnf", "Required to query the package index and download URLs"),
    ("curl", "curl", "Required to download package archives"),
    ("rpm2cpio", "rpm", "Required to unpack RPM archives"),
    ("cpio", "cpio", "Required to unpack RPM archives"),
    ("ldd", "glibc-common", "Required for shared library discovery"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    check_tools(REQUIRED_TOOLS)
}

pub(crate) fn check_tools(tools: &[(&str, &str, &str)]) -> Vec<CheckResult> {
    tools
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose))
        .collect()
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match which::which(tool) {
        Ok(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        Err(_) => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}
