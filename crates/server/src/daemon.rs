//! Background process management for `ordinaryd`.
//!
//! Everything here blocks: the callers are short-lived setup and teardown
//! steps, not services. Do not call into this module from inside a tokio
//! runtime.

use ordinary_core::config::AppConfig;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;

/// Name of the server binary looked up next to the running executable.
pub const SERVER_BINARY: &str = "ordinaryd";

/// Timeout for a single readiness or quit request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Daemon management errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },

    #[error("server binary not found: {0}")]
    BinaryNotFound(String),

    #[error("unable to start nix cache after {attempts} attempts\n{log}")]
    StartupFailed { attempts: u32, log: String },
}

/// Observed daemon state. Never stored; always recomputed by probing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaemonState {
    NotRunning,
    Starting,
    Ready,
    Stopping,
}

/// What [`DaemonController::start`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A server was already answering; nothing was spawned.
    AlreadyRunning,
    /// A server was spawned and became ready.
    Started { pid: u32, attempts: u32 },
}

/// Starts, probes and stops a detached `ordinaryd`.
pub struct DaemonController {
    http: reqwest::blocking::Client,
    base_url: String,
    server_binary: PathBuf,
    server_args: Vec<String>,
    log_file: PathBuf,
    attempts: u32,
    interval: Duration,
}

impl DaemonController {
    /// Create a controller for a server reachable at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        server_binary: impl Into<PathBuf>,
    ) -> Result<Self, DaemonError> {
        let defaults = ordinary_core::DaemonConfig::default();
        let http = reqwest::blocking::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            server_binary: server_binary.into(),
            server_args: Vec::new(),
            log_file: defaults.log_file.clone(),
            attempts: defaults.startup_attempts,
            interval: defaults.startup_interval(),
        })
    }

    /// Create a controller from application configuration.
    ///
    /// The spawned server is told explicitly where to bind and which work
    /// dir to use, so it matches the address probed here.
    pub fn from_config(config: &AppConfig) -> Result<Self, DaemonError> {
        let binary = match &config.daemon.server_binary {
            Some(path) => path.clone(),
            None => default_server_binary()?,
        };
        let mut args = vec![
            "--bind".to_string(),
            config.server.bind.clone(),
            "--dir".to_string(),
            config.server.work_dir.display().to_string(),
        ];
        args.extend(config.daemon.server_args.iter().cloned());

        Ok(Self::new(config.server.base_url(), binary)?
            .with_args(args)
            .with_log_file(&config.daemon.log_file)
            .with_startup(
                config.daemon.startup_attempts,
                config.daemon.startup_interval(),
            ))
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = path.as_ref().to_path_buf();
        self
    }

    /// Bound the readiness loop: `attempts` probes, `interval` apart.
    pub fn with_startup(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts;
        self.interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Probe `/readyz`.
    pub fn is_ready(&self) -> bool {
        match self.http.get(self.url("readyz")).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "not ready");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "not ready");
                false
            }
        }
    }

    pub fn state(&self) -> DaemonState {
        if self.is_ready() {
            DaemonState::Ready
        } else {
            DaemonState::NotRunning
        }
    }

    /// Ensure a server is running, spawning one if nothing answers.
    pub fn start(&self) -> Result<StartOutcome, DaemonError> {
        if self.is_ready() {
            tracing::debug!(base_url = %self.base_url, "server already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let mut child = self.spawn()?;
        let pid = child.id();
        tracing::debug!(pid, state = ?DaemonState::Starting, "server spawned");

        for attempt in 1..=self.attempts {
            std::thread::sleep(self.interval);
            if self.is_ready() {
                tracing::info!(pid, attempts = attempt, "server ready");
                return Ok(StartOutcome::Started {
                    pid,
                    attempts: attempt,
                });
            }
            if let Ok(Some(status)) = child.try_wait() {
                tracing::debug!(%status, "server exited during startup");
                return Err(DaemonError::StartupFailed {
                    attempts: attempt,
                    log: self.read_log().unwrap_or_default(),
                });
            }
        }

        Err(DaemonError::StartupFailed {
            attempts: self.attempts,
            log: self.read_log().unwrap_or_default(),
        })
    }

    fn spawn(&self) -> Result<std::process::Child, DaemonError> {
        let log_error = |source| DaemonError::LogFile {
            path: self.log_file.clone(),
            source,
        };
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(log_error)?;
        let stderr = stdout.try_clone().map_err(log_error)?;

        tracing::debug!(
            binary = %self.server_binary.display(),
            args = ?self.server_args,
            "running server"
        );
        let mut cmd = Command::new(&self.server_binary);
        cmd.args(&self.server_args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Own process group so the server outlives the invoking step.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd.spawn().map_err(|source| DaemonError::Spawn {
            binary: self.server_binary.clone(),
            source,
        })
    }

    /// Ask the server to quit and return its log.
    ///
    /// Never fails: problems are logged as warnings.
    pub fn stop(&self) -> Option<String> {
        tracing::debug!(state = ?DaemonState::Stopping, "stopping server");
        match self.http.get(self.url("quit")).send() {
            Ok(response) => {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                tracing::debug!(%status, body = %body, "quit");
            }
            Err(e) => tracing::warn!(error = %e, "quit request failed"),
        }
        self.read_log()
    }

    fn read_log(&self) -> Option<String> {
        match std::fs::read(&self.log_file) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::warn!(
                    path = %self.log_file.display(),
                    error = %e,
                    "failed to read server log"
                );
                None
            }
        }
    }
}

/// `ordinaryd` next to the current executable.
fn default_server_binary() -> Result<PathBuf, DaemonError> {
    let exe = std::env::current_exe().map_err(|e| {
        DaemonError::BinaryNotFound(format!("cannot locate current executable: {e}"))
    })?;
    let dir = exe
        .parent()
        .ok_or_else(|| DaemonError::BinaryNotFound(exe.display().to_string()))?;
    let candidate = dir.join(SERVER_BINARY);
    if candidate.exists() {
        Ok(candidate)
    } else {
        // Fall back to PATH lookup at spawn time.
        Ok(PathBuf::from(SERVER_BINARY))
    }
}
