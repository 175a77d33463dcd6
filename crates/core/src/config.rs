//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides (`ORDINARY_SERVER__BIND=...`).
pub const ENV_PREFIX: &str = "ORDINARY_";

/// Default configuration file, used when it exists.
pub const DEFAULT_CONFIG_FILE: &str = "ordinary.toml";

/// Protocol server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:18008").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Working directory holding scratch payloads and materialized entries.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Prefix prepended to narinfo ids to form remote cache keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Store directory advertised in `/nix-cache-info`.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    /// Advertise mass query support.
    #[serde(default = "default_want_mass_query")]
    pub want_mass_query: bool,
    /// Substituter priority advertised in `/nix-cache-info`.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Maximum accepted narinfo body size in bytes.
    #[serde(default = "default_max_narinfo_size")]
    pub max_narinfo_size: usize,
    /// Maximum accepted `/upload` body size in bytes.
    #[serde(default = "default_max_upload_body")]
    pub max_upload_body: usize,
    /// Base URL handed to `nix copy --to`. Derived from `bind` when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:18008".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_key_prefix() -> String {
    "nix0:".to_string()
}

fn default_store_dir() -> String {
    "/nix/store".to_string()
}

fn default_want_mass_query() -> bool {
    true
}

fn default_priority() -> u32 {
    10
}

fn default_max_narinfo_size() -> usize {
    1024 * 1024
}

fn default_max_upload_body() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            work_dir: default_work_dir(),
            key_prefix: default_key_prefix(),
            store_dir: default_store_dir(),
            want_mass_query: default_want_mass_query(),
            priority: default_priority(),
            max_narinfo_size: default_max_narinfo_size(),
            max_upload_body: default_max_upload_body(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// URL clients use to reach this server.
    ///
    /// Wildcard bind addresses are reported as `localhost`.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let (host, port) = self
            .bind
            .rsplit_once(':')
            .unwrap_or((self.bind.as_str(), "18008"));
        let host = match host {
            "" | "0.0.0.0" | "127.0.0.1" | "[::]" | "[::1]" => "localhost",
            other => other,
        };
        format!("http://{host}:{port}")
    }

    /// Body served at `/nix-cache-info`.
    pub fn cache_info(&self) -> String {
        format!(
            "StoreDir: {}\nWantMassQuery: {}\nPriority: {}",
            self.store_dir,
            u8::from(self.want_mass_query),
            self.priority
        )
    }

    /// Remote cache key for a narinfo id.
    pub fn cache_key(&self, id: &str) -> String {
        format!("{}{id}", self.key_prefix)
    }
}

/// Remote cache backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    /// In-process snapshot store. Nothing survives a restart.
    Memory,
    /// GitHub Actions cache service.
    Actions {
        /// Cache service base URL. Falls back to `ACTIONS_RESULTS_URL`.
        #[serde(default)]
        results_url: Option<String>,
        /// Bearer token. Falls back to `ACTIONS_RUNTIME_TOKEN`.
        /// WARNING: Prefer the runner-provided env var over storing it in config.
        #[serde(default)]
        runtime_token: Option<String>,
        /// Per-request timeout in seconds.
        #[serde(default = "default_cache_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_cache_timeout_secs() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::Actions {
            results_url: None,
            runtime_token: None,
            timeout_secs: default_cache_timeout_secs(),
        }
    }
}

/// How uploads announced on `/upload` are pushed back into the cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Program invoked as `<nix_binary> copy --to <base url> <paths...>`.
    #[serde(default = "default_nix_binary")]
    pub nix_binary: String,
    /// Extra arguments inserted before the store paths.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_nix_binary() -> String {
    "nix".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            nix_binary: default_nix_binary(),
            extra_args: Vec::new(),
        }
    }
}

/// Background process management for `ordinary start` / `stop`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to the `ordinaryd` binary. Looked up next to the running
    /// executable when unset.
    #[serde(default)]
    pub server_binary: Option<PathBuf>,
    /// File receiving the daemon's stdout and stderr (appended).
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Readiness probes before giving up.
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,
    /// Delay between readiness probes in milliseconds.
    #[serde(default = "default_startup_interval_ms")]
    pub startup_interval_ms: u64,
    /// Extra arguments passed to the server binary.
    #[serde(default)]
    pub server_args: Vec<String>,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/tmp/output.log")
}

fn default_startup_attempts() -> u32 {
    20
}

fn default_startup_interval_ms() -> u64 {
    1000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server_binary: None,
            log_file: default_log_file(),
            startup_attempts: default_startup_attempts(),
            startup_interval_ms: default_startup_interval_ms(),
            server_args: Vec::new(),
        }
    }
}

impl DaemonConfig {
    pub fn startup_interval(&self) -> Duration {
        Duration::from_millis(self.startup_interval_ms)
    }
}

/// Files generated to point Nix at the proxy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HookConfig {
    /// nix.conf fragment exported through `NIX_USER_CONF_FILES`.
    #[serde(default = "default_nix_conf_path")]
    pub nix_conf_path: PathBuf,
    /// Post-build hook script.
    #[serde(default = "default_hook_script_path")]
    pub hook_script_path: PathBuf,
}

fn default_nix_conf_path() -> PathBuf {
    PathBuf::from("/tmp/ghn-nix.conf")
}

fn default_hook_script_path() -> PathBuf {
    PathBuf::from("/tmp/ordinary-post-build-hook.sh")
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            nix_conf_path: default_nix_conf_path(),
            hook_script_path: default_hook_script_path(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Protocol server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote cache backend.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Upload push configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Daemon management.
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Generated nix.conf and hook script.
    #[serde(default)]
    pub hook: HookConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses the in-memory cache and a private work dir.
    pub fn for_testing(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                work_dir: work_dir.into(),
                ..ServerConfig::default()
            },
            cache: CacheConfig::Memory,
            ..Self::default()
        }
    }

    /// Load configuration from an optional TOML file merged with
    /// `ORDINARY_`-prefixed environment variables.
    ///
    /// A missing file is not an error; everything has a default.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))
    }
}
