//! HTTP request handlers.

pub mod lifecycle;
pub mod nix;
pub mod upload;

pub use lifecycle::*;
pub use nix::*;
pub use upload::*;
