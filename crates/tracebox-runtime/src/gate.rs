use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Single-shot latch: once set it stays set.
#[derive(Debug)]
struct Latch {
    set: AtomicBool,
    notify: Notify,
}

impl Latch {
    fn new(set: bool) -> Self {
        Self {
            set: AtomicBool::new(set),
            notify: Notify::new(),
        }
    }

    fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    fn set(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent set() is not missed.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Whether symbol resolution is currently safe, e.g. not mid-reindex.
///
/// Each unavailable period gets a fresh latch. Going unavailable while
/// already unavailable keeps the existing latch, so waiters are released by
/// the next `mark_ready` however many times the state flapped.
#[derive(Debug)]
pub struct ReadinessGate {
    latch: ArcSwap<Latch>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::ready()
    }
}

impl ReadinessGate {
    pub fn ready() -> Self {
        Self {
            latch: ArcSwap::from_pointee(Latch::new(true)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            latch: ArcSwap::from_pointee(Latch::new(false)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.latch.load().is_set()
    }

    pub fn mark_unavailable(&self) {
        self.latch.rcu(|current| {
            if current.is_set() {
                Arc::new(Latch::new(false))
            } else {
                Arc::clone(current)
            }
        });
    }

    pub fn mark_ready(&self) {
        self.latch.load().set();
    }

    /// Resolve once the gate is ready, re-waiting if it flips back to
    /// unavailable before the waiter observes it.
    pub async fn wait_ready(&self) {
        loop {
            let latch = self.latch.load_full();
            latch.wait().await;
            if self.is_ready() {
                return;
            }
        }
    }
}
