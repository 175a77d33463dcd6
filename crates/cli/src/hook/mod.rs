//! Generation of the nix.conf and post-build hook that wire Nix to the
//! running server.

mod templates;

use anyhow::{Context, Result};
use ordinary_core::config::{AppConfig, HookConfig};
use std::path::{Path, PathBuf};

/// Escape a string for safe use as a shell argument.
///
/// Uses single-quoting with embedded single quotes escaped via the
/// `'\''` idiom (end quote, literal quote, start quote).
fn escape_shell_arg(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Render the nix.conf fragment.
pub fn nix_conf(base_url: &str, priority: u32, hook_path: &Path) -> String {
    templates::NIX_CONF
        .replace("{base_url}", base_url)
        .replace("{priority}", &priority.to_string())
        .replace("{hook_path}", &hook_path.display().to_string())
}

/// Render the post-build hook script.
pub fn hook_script(binary_path: &Path, base_url: &str) -> String {
    templates::HOOK_SCRIPT
        .replace(
            "{binary_path}",
            &escape_shell_arg(&binary_path.display().to_string()),
        )
        .replace("{base_url}", &escape_shell_arg(base_url))
}

/// Paths of the written files.
#[derive(Debug)]
pub struct HookFiles {
    pub nix_conf: PathBuf,
    pub hook_script: PathBuf,
}

/// Write the hook script and the nix.conf that references it.
pub fn write_files(config: &AppConfig, binary_path: &Path) -> Result<HookFiles> {
    let HookConfig {
        nix_conf_path,
        hook_script_path,
    } = &config.hook;
    let base_url = config.server.base_url();

    write_file(hook_script_path, &hook_script(binary_path, &base_url))?;
    make_executable(hook_script_path)?;

    let conf = nix_conf(&base_url, config.server.priority, hook_script_path);
    write_file(nix_conf_path, &conf)?;

    tracing::debug!(
        nix_conf = %nix_conf_path.display(),
        hook_script = %hook_script_path.display(),
        "hook files written"
    );
    Ok(HookFiles {
        nix_conf: nix_conf_path.clone(),
        hook_script: hook_script_path.clone(),
    })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to make {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
