//! Audit command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_audit::run_audit;
use beacon_browser::{ChromeLauncher, ChromeLauncherConfig, LighthouseConfig, LighthouseEngine};

use crate::config::{self, Overrides};

/// Run the audit command.
pub async fn run(config_path: &Path, overrides: Overrides) -> Result<()> {
    let resolved = config::load(config_path, overrides)?;

    if !resolved.audit.layout.root.exists() {
        anyhow::bail!(
            "Directory not found: {}. Build the documentation site first.",
            resolved.audit.layout.root.display()
        );
    }

    let launcher = ChromeLauncher::new(ChromeLauncherConfig {
        executable: resolved.chrome,
        ..Default::default()
    });
    let engine = Arc::new(LighthouseEngine::new(LighthouseConfig {
        executable: resolved.lighthouse,
        hostname: resolved.audit.host.clone(),
        ..Default::default()
    }));

    let summary = run_audit(resolved.audit, &launcher, engine)
        .await
        .context("Audit run failed to start")?;

    tracing::info!(
        "Audited {} of {} page(s) in {} attempt(s)",
        summary.succeeded,
        summary.total,
        summary.attempts
    );

    if summary.report_failures > 0 || summary.patch_failures > 0 {
        tracing::warn!(
            "{} report(s) and {} detail page(s) could not be written",
            summary.report_failures,
            summary.patch_failures
        );
    }

    if summary.browser_close_failures > 0 {
        tracing::warn!(
            "{} browser(s) did not exit cleanly",
            summary.browser_close_failures
        );
    }

    Ok(())
}
