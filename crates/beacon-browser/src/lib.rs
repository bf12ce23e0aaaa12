//! Headless browser pool and audit engine adapter.
//!
//! This crate owns the browser processes an audit run drives: it launches a
//! fixed-size pool of isolated Chrome instances, hands them out one audit at a
//! time, and runs Lighthouse against an instance's debugging port.

pub mod chrome;
pub mod lighthouse;
pub mod pool;
pub mod result;
pub mod traits;

pub use chrome::{ChromeLauncher, ChromeLauncherConfig};
pub use lighthouse::{LighthouseConfig, LighthouseEngine};
pub use pool::{BrowserInstance, BrowserPool, Lease, ShutdownReport};
pub use result::{AuditItem, AuditResult, CategoryScore};
pub use traits::{
    AuditEngine, AuditError, BrowserError, BrowserHandle, BrowserLauncher, LaunchedBrowser,
};
