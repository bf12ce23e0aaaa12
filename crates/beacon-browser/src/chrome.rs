//! Headless Chrome launcher built on chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::traits::{BrowserError, BrowserHandle, BrowserLauncher, LaunchedBrowser};

/// Flags for containers and CI hosts without kernel sandbox support.
const CHROME_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];

/// Configuration for launching Chrome instances.
#[derive(Debug, Clone)]
pub struct ChromeLauncherConfig {
    /// Browser executable; chromiumoxide searches the usual locations when unset
    pub executable: Option<PathBuf>,

    /// Parent directory of the per-instance profile directories
    pub profile_root: PathBuf,

    /// How long to wait for the debugging endpoint to come up
    pub launch_timeout: Duration,
}

impl Default for ChromeLauncherConfig {
    fn default() -> Self {
        Self {
            executable: None,
            profile_root: std::env::temp_dir(),
            launch_timeout: Duration::from_secs(20),
        }
    }
}

/// Launches headless Chrome processes, one isolated profile per slot.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: ChromeLauncherConfig,
}

impl ChromeLauncher {
    /// Create a new launcher.
    pub fn new(config: ChromeLauncherConfig) -> Self {
        Self { config }
    }

    fn profile_dir(&self, slot: usize) -> PathBuf {
        self.config
            .profile_root
            .join(format!("beacon-chrome-{}-{}", std::process::id(), slot))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, slot: usize) -> Result<LaunchedBrowser, BrowserError> {
        let profile_dir = self.profile_dir(slot);

        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .no_sandbox()
            .user_data_dir(&profile_dir)
            .launch_timeout(self.config.launch_timeout)
            .args(CHROME_ARGS.iter().copied());

        if let Some(executable) = &self.config.executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder.build().map_err(BrowserError::ConfigError)?;

        let (mut browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| BrowserError::LaunchFailed {
                    slot,
                    message: e.to_string(),
                })?;

        // Drive the CDP connection in the background
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let port = match debugging_port(browser.websocket_address()) {
            Some(port) => port,
            None => {
                let address = browser.websocket_address().clone();
                let _ = browser.kill().await;
                events.abort();
                return Err(BrowserError::LaunchFailed {
                    slot,
                    message: format!("no debugging port in {}", address),
                });
            }
        };

        Ok(LaunchedBrowser {
            port,
            handle: Box::new(ChromeHandle {
                slot,
                browser,
                events,
                profile_dir,
            }),
        })
    }
}

struct ChromeHandle {
    slot: usize,
    browser: Browser,
    events: JoinHandle<()>,
    profile_dir: PathBuf,
}

#[async_trait]
impl BrowserHandle for ChromeHandle {
    async fn close(&mut self) -> Result<(), BrowserError> {
        let closed = self.browser.close().await;

        if closed.is_err() {
            let _ = self.browser.kill().await;
        }

        let waited = self.browser.wait().await;
        self.events.abort();

        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            tracing::debug!(
                "Could not remove profile {}: {}",
                self.profile_dir.display(),
                e
            );
        }

        closed.map_err(|e| BrowserError::CloseFailed {
            instance: self.slot,
            message: e.to_string(),
        })?;
        waited.map_err(|e| BrowserError::CloseFailed {
            instance: self.slot,
            message: e.to_string(),
        })?;

        tracing::debug!("Browser {} exited", self.slot);
        Ok(())
    }
}

/// Extract the port from a DevTools websocket address.
fn debugging_port(ws_address: &str) -> Option<u16> {
    let re = Regex::new(r"^wss?://[^/]*:(\d+)(/|$)").ok()?;
    re.captures(ws_address)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_from_websocket_address() {
        assert_eq!(
            debugging_port("ws://127.0.0.1:39217/devtools/browser/8c2b7a1e"),
            Some(39217)
        );
        assert_eq!(debugging_port("ws://localhost:9222"), Some(9222));
    }

    #[test]
    fn rejects_address_without_port() {
        assert_eq!(debugging_port("ws://localhost/devtools/browser/x"), None);
        assert_eq!(debugging_port("not a url"), None);
    }

    #[test]
    fn profile_dirs_are_unique_per_slot() {
        let launcher = ChromeLauncher::default();
        assert_ne!(launcher.profile_dir(0), launcher.profile_dir(1));
    }
}
