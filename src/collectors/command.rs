use crate::error::TopologyError;
use anyhow::{Context, Result};
use log::debug;
use std::env;
use std::path::Path;
use std::process::Command;

/// Run a command and return its stdout, failing on a non-zero exit status
pub fn run(program: &str, args: &[&str]) -> Result<String> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!("Executing command: {}", command_line);

    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TopologyError::CommandFailed {
            command: command_line,
            reason: format!("{} {}", output.status, stderr.trim()),
        }
        .into());
    }

    // Vendor tools occasionally emit latin-1 in inquiry strings
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether an executable of this name is on PATH
pub fn exists(program: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| is_executable(&dir.join(program)))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
