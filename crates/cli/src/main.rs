//! CI entrypoint for the ordinary Nix binary cache proxy.

mod github;
mod hook;
mod notify;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notify::UploadNotifier;
use ordinary_core::config::AppConfig;
use ordinary_server::{DaemonController, StartOutcome};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// State flag marking that `run` already started the server in this job.
const STATE_STARTED: &str = "ORDINARY_STARTED";

/// Variable other steps use to reach the cache.
const NIX_CACHE_VAR: &str = "ORDINARY_NIX_CACHE";

#[derive(Parser)]
#[command(name = "ordinary")]
#[command(about = "Nix binary cache backed by the CI cache service")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "ORDINARY_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server in the background unless it is already running
    Start,
    /// Stop the server and print its log
    Stop,
    /// Action entrypoint: start and configure Nix, or stop in the post step
    Run,
    /// Ask the server to push store paths (used as the post-build hook)
    Upload {
        /// Server URL
        #[arg(long, env = "ORDINARY_NIX_CACHE")]
        url: Option<String>,
        /// Store paths; defaults to `$OUT_PATHS`
        paths: Vec<String>,
    },
    /// Print the nix.conf fragment for this configuration
    NixConf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { config, command } = Cli::parse();
    let config_path = config.as_deref();

    match command {
        Commands::Start => handle_start(&load_config(config_path)?),
        Commands::Stop => {
            handle_stop(&load_config(config_path)?);
            Ok(())
        }
        Commands::Run => handle_run(&load_config(config_path)?),
        Commands::Upload { url, paths } => {
            // Never fails, including on a broken config.
            handle_upload(config_path, url, paths);
            Ok(())
        }
        Commands::NixConf => {
            let config = load_config(config_path)?;
            print!(
                "{}",
                hook::nix_conf(
                    &config.server.base_url(),
                    config.server.priority,
                    &config.hook.hook_script_path,
                )
            );
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(path).context("failed to load configuration")
}

fn handle_start(config: &AppConfig) -> Result<()> {
    let controller =
        DaemonController::from_config(config).context("failed to set up server control")?;
    match controller.start() {
        Ok(StartOutcome::AlreadyRunning) => {
            tracing::info!(base_url = controller.base_url(), "nix cache already running");
            Ok(())
        }
        Ok(StartOutcome::Started { pid, .. }) => {
            tracing::info!(base_url = controller.base_url(), pid, "nix cache started");
            Ok(())
        }
        Err(ordinary_server::DaemonError::StartupFailed { log, .. }) => {
            println!("{log}");
            anyhow::bail!("unable to start nix cache");
        }
        Err(e) => Err(e).context("unable to start nix cache"),
    }
}

fn handle_stop(config: &AppConfig) {
    let controller = match DaemonController::from_config(config) {
        Ok(controller) => controller,
        Err(e) => {
            tracing::warn!(error = %e, "failed to set up server control");
            return;
        }
    };
    if let Some(log) = controller.stop() {
        println!("{log}");
    }
}

fn handle_run(config: &AppConfig) -> Result<()> {
    if github::get_state(STATE_STARTED).is_some() {
        handle_stop(config);
        return Ok(());
    }

    handle_start(config)?;
    github::save_state(STATE_STARTED, "1")?;

    let binary = std::env::current_exe().context("cannot locate current executable")?;
    let files = hook::write_files(config, &binary)?;
    github::export_variable(NIX_CACHE_VAR, &config.server.base_url())?;
    github::export_variable("NIX_USER_CONF_FILES", &files.nix_conf.display().to_string())?;
    Ok(())
}

fn handle_upload(config: Option<&Path>, url: Option<String>, mut paths: Vec<String>) {
    if paths.is_empty() {
        paths = notify::parse_out_paths(&std::env::var("OUT_PATHS").unwrap_or_default());
    }
    let url = match url {
        Some(url) => url,
        None => match AppConfig::load(config) {
            Ok(config) => config.server.base_url(),
            Err(e) => {
                tracing::debug!(error = %e, "failed to load configuration");
                return;
            }
        },
    };

    let result = UploadNotifier::new(&url).and_then(|notifier| notifier.notify(&paths));
    match result {
        Ok(()) => tracing::debug!(count = paths.len(), "upload requested"),
        Err(e) => tracing::debug!(error = %e, "upload request failed"),
    }
}
