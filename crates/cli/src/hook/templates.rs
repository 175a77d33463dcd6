//! Templates for the files handed to Nix.

/// nix.conf fragment loaded through `NIX_USER_CONF_FILES`.
///
/// Placeholders:
/// - `{base_url}` - URL of the running server
/// - `{priority}` - Substituter priority
/// - `{hook_path}` - Path to the post-build hook script
pub const NIX_CONF: &str = "extra-substituters = {base_url}?priority={priority}&trusted=true
post-build-hook = {hook_path}
";

/// Post-build hook script. Nix runs it after every build with `OUT_PATHS`
/// set.
///
/// Placeholders:
/// - `{binary_path}` - Path to the `ordinary` binary (shell-escaped)
/// - `{base_url}` - URL of the running server (shell-escaped)
pub const HOOK_SCRIPT: &str = r#"#!/bin/sh
set -f
exec {binary_path} upload --url {base_url}
"#;
