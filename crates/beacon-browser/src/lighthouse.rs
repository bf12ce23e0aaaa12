//! Lighthouse audit engine.
//!
//! Runs the Lighthouse CLI as a child process against an already running pool
//! instance and parses the JSON report from its stdout.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::pool::BrowserInstance;
use crate::result::AuditResult;
use crate::traits::{AuditEngine, AuditError};

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT: usize = 2000;

/// Configuration for the Lighthouse CLI.
#[derive(Debug, Clone)]
pub struct LighthouseConfig {
    /// Lighthouse executable
    pub executable: String,

    /// Host the debugging port is reachable on
    pub hostname: String,

    /// Additional CLI arguments (e.g. "--max-wait-for-load=45000")
    pub extra_args: Vec<String>,
}

impl Default for LighthouseConfig {
    fn default() -> Self {
        Self {
            executable: "lighthouse".to_string(),
            hostname: "127.0.0.1".to_string(),
            extra_args: vec![],
        }
    }
}

/// [`AuditEngine`] backed by the Lighthouse CLI.
///
/// Timeouts are Lighthouse's own (`--max-wait-for-load`); no extra limit is
/// applied here.
#[derive(Debug, Clone, Default)]
pub struct LighthouseEngine {
    config: LighthouseConfig,
}

impl LighthouseEngine {
    /// Create a new engine.
    pub fn new(config: LighthouseConfig) -> Self {
        Self { config }
    }

    fn args(&self, url: &str, instance: &BrowserInstance, categories: &[String]) -> Vec<String> {
        let mut args = vec![
            url.to_string(),
            format!("--port={}", instance.port),
            format!("--hostname={}", self.config.hostname),
            format!("--only-categories={}", categories.join(",")),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl AuditEngine for LighthouseEngine {
    async fn audit(
        &self,
        url: &str,
        instance: &BrowserInstance,
        categories: &[String],
    ) -> Result<AuditResult, AuditError> {
        tracing::debug!("Running {} for {} on port {}", self.config.executable, url, instance.port);

        let output = Command::new(&self.config.executable)
            .args(self.args(url, instance, categories))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AuditError::Spawn(format!("{}: {}", self.config.executable, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::EngineFailed {
                status: output.status.code(),
                stderr: excerpt(stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        AuditResult::from_lighthouse_json(&stdout, categories)
    }
}

/// Keep the tail of a long message, where the actual error usually is.
fn excerpt(text: &str) -> String {
    let count = text.chars().count();
    if count > STDERR_EXCERPT {
        let tail: String = text.chars().skip(count - STDERR_EXCERPT).collect();
        format!("...{}", tail)
    } else {
        text.to_string()
    }
}
