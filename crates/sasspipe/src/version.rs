use std::process::Command;

use serde::Deserialize;

use crate::conn;
use crate::error::{Error, Result};

/// Version information reported by the compiler via `--version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerVersion {
    pub protocol_version: String,
    pub compiler_version: String,
    pub implementation_version: String,
    pub implementation_name: String,
    #[serde(default)]
    pub id: u32,
}

/// Invoke `filename --version` and parse the single JSON line it prints to
/// stdout. The executable is resolved the same way
/// [`Transpiler::start`](crate::Transpiler::start) resolves it.
pub fn version(filename: &str) -> Result<CompilerVersion> {
    let bin = conn::look_path(filename)?;
    let output = Command::new(bin).arg("--version").output()?;
    if !output.status.success() {
        return Err(Error::Version(format!(
            "{}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_version_output(&output.stdout)
}

fn parse_version_output(stdout: &[u8]) -> Result<CompilerVersion> {
    serde_json::from_slice(stdout).map_err(|err| Error::Version(err.to_string()))
}
