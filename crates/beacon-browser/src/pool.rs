//! Fixed-size pool of browser instances.
//!
//! Instances are launched once, claimed through [`BrowserPool::acquire`] for the
//! duration of a single audit, and only terminated by [`BrowserPool::shutdown`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;

use crate::traits::{BrowserError, BrowserHandle, BrowserLauncher};

/// An addressable pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserInstance {
    /// Pool slot the instance was launched into
    pub id: usize,

    /// Remote debugging port
    pub port: u16,
}

impl BrowserInstance {
    /// HTTP endpoint of the remote debugging protocol.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

struct Slot {
    instance: BrowserInstance,
    available: bool,
    handle: Option<Box<dyn BrowserHandle>>,
}

/// Outcome of [`BrowserPool::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Instances that exited cleanly
    pub closed: usize,

    /// Per-instance failures
    pub failed: Vec<BrowserError>,
}

/// Pool of launched browser instances.
pub struct BrowserPool {
    slots: Mutex<Vec<Slot>>,
    shutdown_timeout: Duration,
}

impl BrowserPool {
    /// Launch `n` browsers with `launcher`.
    ///
    /// A slot whose launch fails is logged and left out, so the pool may be
    /// smaller than requested. Fails only when no browser launched at all.
    pub async fn start<L>(
        launcher: &L,
        n: usize,
        shutdown_timeout: Duration,
    ) -> Result<Arc<Self>, BrowserError>
    where
        L: BrowserLauncher + ?Sized,
    {
        tracing::info!("Launching {} browser instance(s)", n);

        let mut slots = Vec::with_capacity(n);

        for slot in 0..n {
            match launcher.launch(slot).await {
                Ok(launched) => {
                    tracing::debug!(
                        "Browser {} listening for debugging on port {}",
                        slot,
                        launched.port
                    );
                    slots.push(Slot {
                        instance: BrowserInstance {
                            id: slot,
                            port: launched.port,
                        },
                        available: true,
                        handle: Some(launched.handle),
                    });
                }
                Err(e) => {
                    tracing::warn!("Browser slot {} failed to launch: {}", slot, e);
                }
            }
        }

        if slots.is_empty() {
            return Err(BrowserError::NoInstances { requested: n });
        }

        if slots.len() < n {
            tracing::warn!(
                "Continuing with {} of {} browser instances",
                slots.len(),
                n
            );
        } else {
            tracing::info!("Launched {} browser instance(s)", slots.len());
        }

        Ok(Arc::new(Self {
            slots: Mutex::new(slots),
            shutdown_timeout,
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of launched instances.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Number of instances not currently claimed.
    pub fn available(&self) -> usize {
        self.lock().iter().filter(|s| s.available).count()
    }

    /// Claim the first free instance, or `None` when every instance is busy.
    ///
    /// Never blocks. The claim is returned to the pool when the lease is
    /// released or dropped.
    pub fn acquire(self: &Arc<Self>) -> Option<Lease> {
        let mut slots = self.lock();
        let slot = slots.iter_mut().find(|s| s.available)?;
        slot.available = false;

        Some(Lease {
            pool: Arc::clone(self),
            instance: slot.instance,
        })
    }

    fn release(&self, instance: &BrowserInstance) {
        let mut slots = self.lock();
        match slots.iter_mut().find(|s| s.instance.id == instance.id) {
            Some(slot) => slot.available = true,
            None => tracing::warn!("Released unknown browser instance {}", instance.id),
        }
    }

    /// Terminate every instance.
    ///
    /// Instances are closed concurrently and each close is bounded by the
    /// shutdown timeout, so one hung browser cannot hold up the others.
    pub async fn shutdown(&self) -> ShutdownReport {
        let handles: Vec<(usize, Box<dyn BrowserHandle>)> = self
            .lock()
            .iter_mut()
            .filter_map(|s| s.handle.take().map(|h| (s.instance.id, h)))
            .collect();

        tracing::info!("Shutting down {} browser instance(s)", handles.len());

        let timeout = self.shutdown_timeout;
        let results = join_all(handles.into_iter().map(|(id, mut handle)| async move {
            match tokio::time::timeout(timeout, handle.close()).await {
                Ok(result) => result,
                Err(_) => Err(BrowserError::CloseTimedOut { instance: id }),
            }
        }))
        .await;

        let mut report = ShutdownReport::default();
        for result in results {
            match result {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    tracing::error!("{}", e);
                    report.failed.push(e);
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.lock();
        f.debug_struct("BrowserPool")
            .field("size", &slots.len())
            .field(
                "available",
                &slots.iter().filter(|s| s.available).count(),
            )
            .finish()
    }
}

/// Exclusive claim on one pool instance.
///
/// Dropping the lease marks the instance available again, so a claim cannot
/// leak even if the audit holding it panics.
pub struct Lease {
    pool: Arc<BrowserPool>,
    instance: BrowserInstance,
}

impl Lease {
    /// The claimed instance.
    pub fn instance(&self) -> &BrowserInstance {
        &self.instance
    }

    /// Return the instance to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.release(&self.instance);
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("instance", &self.instance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LaunchedBrowser;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum CloseBehavior {
        Clean,
        Fail,
        Hang,
    }

    struct FakeHandle {
        behavior: CloseBehavior,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserHandle for FakeHandle {
        async fn close(&mut self) -> Result<(), BrowserError> {
            match self.behavior {
                CloseBehavior::Clean => {
                    self.closed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                CloseBehavior::Fail => Err(BrowserError::CloseFailed {
                    instance: 0,
                    message: "boom".to_string(),
                }),
                CloseBehavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }

    struct FakeLauncher {
        failing_slots: Vec<usize>,
        behaviors: Vec<CloseBehavior>,
        closed: Arc<AtomicUsize>,
    }

    impl FakeLauncher {
        fn new(behaviors: Vec<CloseBehavior>) -> Self {
            Self {
                failing_slots: vec![],
                behaviors,
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self, slot: usize) -> Result<LaunchedBrowser, BrowserError> {
            if self.failing_slots.contains(&slot) {
                return Err(BrowserError::LaunchFailed {
                    slot,
                    message: "no chrome".to_string(),
                });
            }

            Ok(LaunchedBrowser {
                port: 9000 + slot as u16,
                handle: Box::new(FakeHandle {
                    behavior: self.behaviors[slot],
                    closed: Arc::clone(&self.closed),
                }),
            })
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn hands_out_each_instance_once() {
        let launcher = FakeLauncher::new(vec![CloseBehavior::Clean; 2]);
        let pool = BrowserPool::start(&launcher, 2, TIMEOUT).await.unwrap();

        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_ne!(first.instance().id, second.instance().id);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.available(), 0);

        first.release();
        assert_eq!(pool.available(), 1);

        let third = pool.acquire().unwrap();
        assert_eq!(third.instance().port, 9000);
        drop(second);
        drop(third);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn tolerates_partial_launch_failure() {
        let mut launcher = FakeLauncher::new(vec![CloseBehavior::Clean; 2]);
        launcher.failing_slots = vec![1];

        let pool = BrowserPool::start(&launcher, 2, TIMEOUT).await.unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn fails_when_nothing_launches() {
        let mut launcher = FakeLauncher::new(vec![CloseBehavior::Clean; 2]);
        launcher.failing_slots = vec![0, 1];

        let result = BrowserPool::start(&launcher, 2, TIMEOUT).await;
        assert!(matches!(
            result,
            Err(BrowserError::NoInstances { requested: 2 })
        ));
    }

    #[tokio::test]
    async fn shutdown_survives_failing_and_hung_instances() {
        let launcher = FakeLauncher::new(vec![
            CloseBehavior::Hang,
            CloseBehavior::Fail,
            CloseBehavior::Clean,
        ]);
        let pool = BrowserPool::start(&launcher, 3, TIMEOUT).await.unwrap();

        let report = pool.shutdown().await;

        assert_eq!(report.closed, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .iter()
            .any(|e| matches!(e, BrowserError::CloseTimedOut { instance: 0 })));
        assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);

        // Handles are consumed; a second shutdown has nothing to close.
        let again = pool.shutdown().await;
        assert_eq!(again.closed, 0);
        assert!(again.failed.is_empty());
    }

    #[test]
    fn endpoint_uses_debugging_port() {
        let instance = BrowserInstance { id: 0, port: 9222 };
        assert_eq!(instance.endpoint(), "http://127.0.0.1:9222");
    }
}
