//! GitHub Actions file commands.
//!
//! Outside Actions the variables are printed as `export` lines instead.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Environment file read by later workflow steps.
pub const GITHUB_ENV: &str = "GITHUB_ENV";
/// State file read back by this action's post step.
pub const GITHUB_STATE: &str = "GITHUB_STATE";

/// Read a value saved with [`save_state`] in an earlier step.
///
/// Actions exposes saved state as `STATE_<name>`; empty counts as unset.
pub fn get_state(name: &str) -> Option<String> {
    std::env::var(format!("STATE_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Persist `name=value` for the post step.
pub fn save_state(name: &str, value: &str) -> Result<()> {
    match std::env::var_os(GITHUB_STATE) {
        Some(path) => append_command(Path::new(&path), name, value),
        None => {
            tracing::debug!(name, value, "GITHUB_STATE not set, state not saved");
            Ok(())
        }
    }
}

/// Export a variable to later workflow steps.
pub fn export_variable(name: &str, value: &str) -> Result<()> {
    match std::env::var_os(GITHUB_ENV) {
        Some(path) => append_command(Path::new(&path), name, value),
        None => {
            println!("export {name}={value}");
            Ok(())
        }
    }
}

fn append_command(path: &Path, name: &str, value: &str) -> Result<()> {
    if name.contains('=') || name.contains('\n') || value.contains('\n') {
        anyhow::bail!("cannot write {name} to {}: invalid characters", path.display());
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "{name}={value}").with_context(|| format!("failed to write {}", path.display()))
}
