//! Remote cache backend implementations.

pub mod actions;
pub mod memory;
