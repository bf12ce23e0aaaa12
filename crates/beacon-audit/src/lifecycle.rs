//! One complete audit run: serve, launch, audit, tear down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_browser::{AuditEngine, BrowserLauncher, BrowserPool};
use beacon_report::ReportWriter;
use beacon_server::{ServerHandle, StaticServer, StaticServerConfig};

use crate::layout::SiteLayout;
use crate::orchestrator::{AuditSettings, AuditSummary, Orchestrator, OrchestratorError};

/// Configuration for [`run_audit`].
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Built site to serve and audit
    pub layout: SiteLayout,

    /// Interface the static server binds to
    pub host: String,

    /// Port the static server binds to
    pub port: u16,

    /// Browser instances to launch
    pub instances: usize,

    /// Categories to audit
    pub categories: Vec<String>,

    /// Retries allowed per page; `None` retries until success
    pub max_retries: Option<u32>,

    /// How long each browser gets to exit at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            layout: SiteLayout::default(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            instances: 1,
            categories: vec!["accessibility".to_string()],
            max_retries: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Audit every preview page of a built site.
///
/// Serves `config.layout.root`, launches `config.instances` browsers through
/// `launcher`, audits each page with `engine` until it succeeds, then stops the
/// server and closes every browser. Start-up failures (port in use, no browser
/// launched, missing preview directory) are returned before any audit runs.
pub async fn run_audit(
    config: AuditConfig,
    launcher: &dyn BrowserLauncher,
    engine: Arc<dyn AuditEngine>,
) -> Result<AuditSummary, OrchestratorError> {
    let started = Instant::now();

    tracing::info!("Audit run starting");

    let server = StaticServer::bind(StaticServerConfig {
        root: config.layout.root.clone(),
        host: config.host.clone(),
        port: config.port,
    })
    .await?
    .spawn()?;

    let pool = match BrowserPool::start(launcher, config.instances, config.shutdown_timeout).await {
        Ok(pool) => pool,
        Err(e) => {
            stop_server(server).await;
            return Err(e.into());
        }
    };

    let prepared = config
        .layout
        .discover(&server.base_url())
        .and_then(|pages| Ok((pages, ReportWriter::new(config.layout.report_dir())?)));

    let (pages, reports) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            teardown(server, &pool).await;
            return Err(e);
        }
    };

    tracing::info!("Found {} preview page(s) to audit", pages.len());

    let settings = AuditSettings {
        categories: config.categories.clone(),
        max_retries: config.max_retries,
    };
    let mut orchestrator = Orchestrator::new(
        Arc::clone(&pool),
        engine,
        reports,
        config.layout.clone(),
        settings,
        pages,
    );

    let outcome = orchestrator.run().await;

    let (closed, failed) = teardown(server, &pool).await;
    orchestrator.stop();
    outcome?;

    let elapsed = started.elapsed();
    tracing::info!("{}", elapsed_message(elapsed));

    let mut summary = orchestrator.summary();
    summary.browsers_closed = closed;
    summary.browser_close_failures = failed;
    summary.elapsed = elapsed;

    if !summary.abandoned.is_empty() {
        tracing::warn!(
            "{} page(s) abandoned: {}",
            summary.abandoned.len(),
            summary.abandoned.join(", ")
        );
    }

    Ok(summary)
}

/// Whole minutes plus the remaining seconds, rounded.
fn elapsed_message(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let minutes = (secs / 60.0).floor();
    let seconds = (secs - minutes * 60.0).round();

    format!("Accessibility audits took {}min {}secs", minutes, seconds)
}

async fn stop_server(server: ServerHandle) {
    if let Err(e) = server.stop().await {
        tracing::warn!("Static server did not stop cleanly: {}", e);
    }
}

/// Stop the server, then close every browser.
async fn teardown(server: ServerHandle, pool: &BrowserPool) -> (usize, usize) {
    stop_server(server).await;

    let report = pool.shutdown().await;
    (report.closed, report.failed.len())
}
