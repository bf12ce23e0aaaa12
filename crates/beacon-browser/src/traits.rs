//! Trait definitions for browsers and audit engines.

use async_trait::async_trait;

use crate::pool::BrowserInstance;
use crate::result::AuditResult;

/// Errors raised while launching, using, or closing browser instances.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to launch browser in slot {slot}: {message}")]
    LaunchFailed { slot: usize, message: String },

    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    #[error("Failed to close browser instance {instance}: {message}")]
    CloseFailed { instance: usize, message: String },

    #[error("Browser instance {instance} did not exit in time")]
    CloseTimedOut { instance: usize },

    #[error("No browser instances could be launched ({requested} requested)")]
    NoInstances { requested: usize },
}

/// Errors from a single audit attempt.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Failed to start audit engine: {0}")]
    Spawn(String),

    #[error("Audit engine exited with status {status:?}: {stderr}")]
    EngineFailed { status: Option<i32>, stderr: String },

    #[error("Audit engine produced an unreadable report: {0}")]
    InvalidReport(String),

    #[error("Audit engine reported {code}: {message}")]
    RuntimeError { code: String, message: String },

    #[error("Report has no score for category '{0}'")]
    MissingCategory(String),
}

/// A running browser process owned by the pool.
#[async_trait]
pub trait BrowserHandle: Send {
    /// Terminate the process and wait for it to exit.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// A freshly launched browser, before it joins the pool.
pub struct LaunchedBrowser {
    /// Remote debugging port
    pub port: u16,

    /// Process handle used at shutdown
    pub handle: Box<dyn BrowserHandle>,
}

impl std::fmt::Debug for LaunchedBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedBrowser")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Starts browser processes for the pool.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch the browser for pool slot `slot`.
    async fn launch(&self, slot: usize) -> Result<LaunchedBrowser, BrowserError>;
}

/// Runs one category-scoped audit of a URL inside a pool instance.
///
/// Implementations may be slow and may fail; callers must not assume either
/// bounded latency or success.
#[async_trait]
pub trait AuditEngine: Send + Sync {
    /// Audit `url` using the browser behind `instance`.
    ///
    /// # Arguments
    /// * `url` - Page to load
    /// * `instance` - Pool instance whose debugging port the engine connects to
    /// * `categories` - Audit categories to run (e.g. "accessibility")
    async fn audit(
        &self,
        url: &str,
        instance: &BrowserInstance,
        categories: &[String],
    ) -> Result<AuditResult, AuditError>;
}
