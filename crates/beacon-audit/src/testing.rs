//! In-process stand-ins for browsers and the audit engine.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use beacon_browser::{
    AuditEngine, AuditError, AuditItem, AuditResult, BrowserError, BrowserHandle, BrowserInstance,
    BrowserLauncher, CategoryScore, LaunchedBrowser,
};

use crate::layout::SiteLayout;

pub(crate) const DETAIL_PAGE: &str = r##"<!DOCTYPE html>
<html>
<body>
<div class="Browser" data-behaviour="browser" id="browser-1">
  <ul class="Browser-tabs">
    <li class="Browser-tab Browser-tab--html is-active" data-role="tab"><a href="#browser-1-panel-html">HTML</a></li>
  </ul>
  <div class="Browser-panel Browser-html is-active" id="browser-1-panel-html" data-role="tab-panel"></div>
</div>
</body>
</html>"##;

/// A built site in a temp directory with one preview and detail page per id.
pub(crate) struct TestSite {
    _temp: TempDir,
    pub layout: SiteLayout,
}

impl TestSite {
    pub fn new(ids: &[&str]) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let layout = SiteLayout::new(temp.path());

        fs::create_dir_all(layout.preview_dir()).unwrap();
        fs::create_dir_all(layout.detail_dir()).unwrap();

        for id in ids {
            fs::write(
                layout.preview_dir().join(id),
                format!("<button>{}</button>", id),
            )
            .unwrap();
            fs::write(layout.detail_dir().join(id), DETAIL_PAGE).unwrap();
        }

        Self {
            _temp: temp,
            layout,
        }
    }

    pub fn detail(&self, id: &str) -> String {
        fs::read_to_string(self.layout.detail_dir().join(id)).unwrap()
    }

    pub fn a11y_tab_count(&self, id: &str) -> usize {
        self.detail(id).matches("Browser-tab--a11y").count()
    }

    pub fn report_path(&self, id: &str) -> PathBuf {
        self.layout.report_dir().join(id)
    }
}

struct TestHandle {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserHandle for TestHandle {
    async fn close(&mut self) -> Result<(), BrowserError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches fake browsers, optionally failing some slots.
#[derive(Default)]
pub(crate) struct TestLauncher {
    pub failing_slots: Vec<usize>,
    pub launched: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl TestLauncher {
    pub fn failing(slots: Vec<usize>) -> Self {
        Self {
            failing_slots: slots,
            ..Default::default()
        }
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for TestLauncher {
    async fn launch(&self, slot: usize) -> Result<LaunchedBrowser, BrowserError> {
        if self.failing_slots.contains(&slot) {
            return Err(BrowserError::LaunchFailed {
                slot,
                message: "chrome not found".to_string(),
            });
        }

        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(LaunchedBrowser {
            port: 9222 + slot as u16,
            handle: Box::new(TestHandle {
                closed: Arc::clone(&self.closed),
            }),
        })
    }
}

/// Outcome of one scripted audit call.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Fail,
    Panic,
    Score(f64),
}

/// Audit engine whose outcomes are scripted per page.
///
/// Pages without a script (or whose script ran out) score 0.9.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    delay: Duration,
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedEngine {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Queue outcomes for the page whose URL ends with `id`.
    pub fn script(&self, id: &str, outcomes: Vec<Script>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), outcomes);
    }

    pub fn calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, id: &str) -> Script {
        *self.calls.lock().unwrap().entry(id.to_string()).or_default() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(id) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Script::Score(0.9),
        }
    }
}

#[async_trait]
impl AuditEngine for ScriptedEngine {
    async fn audit(
        &self,
        url: &str,
        _instance: &BrowserInstance,
        categories: &[String],
    ) -> Result<AuditResult, AuditError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let id = url.rsplit('/').next().unwrap_or(url).to_string();
        let outcome = self.next_outcome(&id);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        match outcome {
            Script::Fail => Err(AuditError::EngineFailed {
                status: Some(1),
                stderr: "Runtime error encountered: navigation timed out".to_string(),
            }),
            Script::Panic => panic!("engine crashed auditing {}", id),
            Script::Score(score) => Ok(result(url, categories, score)),
        }
    }
}

pub(crate) fn result(url: &str, categories: &[String], score: f64) -> AuditResult {
    let categories = categories
        .iter()
        .map(|id| CategoryScore {
            id: id.clone(),
            title: "Accessibility".to_string(),
            score,
            audit_ids: vec!["button-name".to_string()],
        })
        .collect();

    AuditResult {
        requested_url: url.to_string(),
        final_url: url.to_string(),
        fetch_time: "2024-05-01T10:00:00.000Z".to_string(),
        engine_version: "12.0.0".to_string(),
        categories,
        audits: vec![AuditItem {
            id: "button-name".to_string(),
            title: "Buttons have an accessible name".to_string(),
            description: "When a button doesn't have an accessible name, screen readers announce it as \"button\".".to_string(),
            score: Some(1.0),
            display_mode: "binary".to_string(),
        }],
    }
}

/// Log output captured from the current thread.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's logs into a buffer until the guard is dropped.
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
