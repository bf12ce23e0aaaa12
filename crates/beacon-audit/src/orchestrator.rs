//! Audit scheduling.
//!
//! The orchestrator keeps a queue of pending pages and a set of in-flight audit
//! tasks. It claims a free browser for each pending page until either runs out,
//! then waits for the next audit to finish. A failed audit goes back on the
//! queue; a successful one is persisted and counted. The run is over when every
//! page has succeeded (or, with a retry ceiling, been abandoned).

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;

use beacon_browser::{AuditEngine, AuditError, AuditResult, BrowserError, BrowserPool, Lease};
use beacon_report::{DetailPatcher, ReportError, ReportWriter};
use beacon_server::ServerError;

use crate::layout::{PreviewPage, SiteLayout};

/// Errors that abort an audit run.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Pool(#[from] BrowserError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Failed to discover previews in {path}: {message}")]
    Discovery { path: String, message: String },

    #[error("{pending} page(s) pending but no browser is free and none is busy")]
    Stalled { pending: usize },

    #[error("Audit task was lost: {0}")]
    TaskLost(String),
}

/// Why one audit attempt failed.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("audit panicked: {0}")]
    Panicked(String),
}

/// Lifecycle of an audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Per-run audit settings.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Categories passed to the engine; the first one labels detail pages
    pub categories: Vec<String>,

    /// Retries allowed after a page's first failed attempt; `None` retries forever
    pub max_retries: Option<u32>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            categories: vec!["accessibility".to_string()],
            max_retries: None,
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    /// Pages discovered
    pub total: usize,

    /// Pages audited successfully
    pub succeeded: usize,

    /// Pages that exhausted the retry ceiling
    pub abandoned: Vec<String>,

    /// Audit attempts dispatched, retries included
    pub attempts: usize,

    /// Pages whose report could not be written
    pub report_failures: usize,

    /// Pages whose detail page could not be patched
    pub patch_failures: usize,

    /// Browsers that exited cleanly at shutdown
    pub browsers_closed: usize,

    /// Browsers that failed to exit at shutdown
    pub browser_close_failures: usize,

    /// Wall-clock time of the whole run
    pub elapsed: Duration,
}

/// A page and the attempts spent on it so far.
#[derive(Debug)]
struct AuditJob {
    page: PreviewPage,
    attempts: u32,
}

/// How persisting a successful audit went.
#[derive(Debug, Clone, Copy, Default)]
struct Persisted {
    report_failed: bool,
    patch_failed: bool,
}

/// What an audit task hands back to the orchestrator.
struct Completion {
    job: AuditJob,
    outcome: Result<Persisted, AttemptError>,
}

/// Writes the report and patches the detail page of an audited page.
struct Persister {
    reports: ReportWriter,
    patcher: DetailPatcher,
}

impl Persister {
    /// Failures here are logged and counted but never retried; the audit
    /// itself succeeded.
    fn persist(&self, page_id: &str, report_href: &str, result: &AuditResult) -> Persisted {
        if let Err(e) = self.reports.write_report(page_id, result) {
            tracing::error!("Failed to write report for {}: {}", page_id, e);
            return Persisted {
                report_failed: true,
                patch_failed: false,
            };
        }

        let Some(score) = result.primary().map(|c| c.percent()) else {
            tracing::warn!("No score to show on the detail page of {}", page_id);
            return Persisted {
                report_failed: false,
                patch_failed: true,
            };
        };

        if let Err(e) = self.patcher.patch(page_id, report_href, score) {
            tracing::warn!("Failed to patch detail page of {}: {}", page_id, e);
            return Persisted {
                report_failed: false,
                patch_failed: true,
            };
        }

        Persisted::default()
    }
}

/// Schedules audits of preview pages onto a browser pool.
pub struct Orchestrator {
    pool: Arc<BrowserPool>,
    engine: Arc<dyn AuditEngine>,
    persister: Arc<Persister>,
    layout: SiteLayout,
    settings: Arc<AuditSettings>,
    state: RunState,
    pending: VecDeque<AuditJob>,
    in_flight: JoinSet<Completion>,
    total: usize,
    started: usize,
    completed: usize,
    summary: AuditSummary,
}

impl Orchestrator {
    /// Create an orchestrator for `pages`.
    pub fn new(
        pool: Arc<BrowserPool>,
        engine: Arc<dyn AuditEngine>,
        reports: ReportWriter,
        layout: SiteLayout,
        settings: AuditSettings,
        pages: Vec<PreviewPage>,
    ) -> Self {
        let total = pages.len();
        let pending = pages
            .into_iter()
            .map(|page| AuditJob { page, attempts: 0 })
            .collect();

        Self {
            pool,
            engine,
            persister: Arc::new(Persister {
                reports,
                patcher: DetailPatcher::new(layout.detail_dir()),
            }),
            layout,
            settings: Arc::new(settings),
            state: RunState::Starting,
            pending,
            in_flight: JoinSet::new(),
            total,
            started: 0,
            completed: 0,
            summary: AuditSummary {
                total,
                ..Default::default()
            },
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Pages audited successfully so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Totals gathered so far.
    pub fn summary(&self) -> AuditSummary {
        AuditSummary {
            succeeded: self.completed,
            ..self.summary.clone()
        }
    }

    fn transition(&mut self, next: RunState) {
        tracing::info!("Audit run {} -> {}", self.state, next);
        self.state = next;
    }

    fn is_finished(&self) -> bool {
        self.completed + self.summary.abandoned.len() >= self.total
    }

    /// Audit every page, returning once all of them are settled.
    pub async fn run(&mut self) -> Result<(), OrchestratorError> {
        self.transition(RunState::Running);

        loop {
            self.dispatch();

            if self.is_finished() {
                break;
            }

            match self.in_flight.join_next().await {
                Some(Ok(completion)) => self.complete(completion),
                Some(Err(e)) => return Err(OrchestratorError::TaskLost(e.to_string())),
                None => {
                    return Err(OrchestratorError::Stalled {
                        pending: self.pending.len(),
                    })
                }
            }
        }

        self.transition(RunState::Draining);
        Ok(())
    }

    /// Mark the run as finished.
    pub fn stop(&mut self) {
        self.transition(RunState::Stopped);
    }

    /// Start audits until no page is pending or no browser is free.
    fn dispatch(&mut self) {
        while let Some(mut job) = self.pending.pop_front() {
            let Some(lease) = self.pool.acquire() else {
                self.pending.push_front(job);
                break;
            };

            if job.attempts == 0 {
                self.started += 1;
            }
            job.attempts += 1;
            self.summary.attempts += 1;

            tracing::info!(
                "Auditing {} ({} of {}, attempt {}) on browser {}",
                job.page.id,
                self.started,
                self.total,
                job.attempts,
                lease.instance().id
            );

            let engine = Arc::clone(&self.engine);
            let settings = Arc::clone(&self.settings);
            let persister = Arc::clone(&self.persister);
            let report_href = self.layout.report_href(&job.page.id);

            self.in_flight.spawn(async move {
                let outcome = match audit_once(engine.as_ref(), &job.page, lease, &settings).await {
                    Ok(result) => {
                        Ok(persist_blocking(persister, &job.page.id, report_href, result).await)
                    }
                    Err(e) => Err(e),
                };

                Completion { job, outcome }
            });
        }
    }

    /// Handle a finished audit.
    fn complete(&mut self, completion: Completion) {
        let Completion { job, outcome } = completion;

        match outcome {
            Ok(persisted) => {
                if persisted.report_failed {
                    self.summary.report_failures += 1;
                }
                if persisted.patch_failed {
                    self.summary.patch_failures += 1;
                }
                self.completed += 1;
                tracing::info!(
                    "Audited {} ({} of {} complete)",
                    job.page.id,
                    self.completed,
                    self.total
                );
            }
            Err(e) => {
                tracing::error!(
                    "Accessibility audit of {} failed (attempt {}): {}",
                    job.page.id,
                    job.attempts,
                    e
                );
                self.requeue(job);
            }
        }
    }

    fn requeue(&mut self, job: AuditJob) {
        if let Some(max_retries) = self.settings.max_retries {
            if job.attempts > max_retries {
                tracing::error!(
                    "Giving up on {} after {} attempts",
                    job.page.id,
                    job.attempts
                );
                self.summary.abandoned.push(job.page.id);
                return;
            }
        }

        self.pending.push_back(job);
    }
}

/// Run one audit on `lease`'s browser, returning the browser to the pool as
/// soon as the engine is done with it.
async fn audit_once(
    engine: &dyn AuditEngine,
    page: &PreviewPage,
    lease: Lease,
    settings: &AuditSettings,
) -> Result<AuditResult, AttemptError> {
    let audit = engine.audit(&page.url, lease.instance(), &settings.categories);
    let outcome = match AssertUnwindSafe(audit).catch_unwind().await {
        Ok(result) => result.map_err(AttemptError::from),
        Err(panic) => Err(AttemptError::Panicked(panic_message(panic.as_ref()))),
    };

    lease.release();
    outcome
}

/// Persist on the blocking pool so file IO never holds up the dispatch loop.
async fn persist_blocking(
    persister: Arc<Persister>,
    page_id: &str,
    report_href: String,
    result: AuditResult,
) -> Persisted {
    let id = page_id.to_string();
    let task = tokio::task::spawn_blocking(move || persister.persist(&id, &report_href, &result));

    task.await.unwrap_or_else(|e| {
        tracing::error!("Failed to persist results for {}: {}", page_id, e);
        Persisted {
            report_failed: true,
            patch_failed: false,
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
