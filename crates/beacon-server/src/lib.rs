//! Static file server for beacon audits.
//!
//! Serves a pre-built documentation tree over plain HTTP so headless browsers
//! can load component previews by URL.

pub mod server;

pub use server::{ServerError, ServerHandle, StaticServer, StaticServerConfig};
