//! Nix binary cache protocol server for ordinary.
//!
//! This crate provides:
//! - The cache protocol router (narinfo, nar, `/upload`, lifecycle routes)
//! - The payload URL index and shared server state
//! - [`daemon::DaemonController`] for running `ordinaryd` in the background

pub mod daemon;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use daemon::{DaemonController, DaemonError, DaemonState, StartOutcome};
pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, UrlIndex};
