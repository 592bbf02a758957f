//! CLI command implementations.

pub mod check;
pub mod clear_cache;
pub mod common;
pub mod init;
pub mod repair;
pub mod status;
