//! CLI command implementations.

pub mod audit;
pub mod init;
pub mod serve;
