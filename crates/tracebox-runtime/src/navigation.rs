//! Background resolution of trace lines to source locations.
//!
//! Lines are scheduled as traces arrive and resolved one at a time by a
//! single worker. Readers only ever see a complete `{handle, target}` pair
//! and never wait on the worker. A failed or empty re-resolution keeps the
//! previous pair, so a line that once resolved keeps pointing somewhere even
//! while the index is rebuilding.

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracebox_types::{LineId, Navigable, SymbolQuery, TraceEvent};

use crate::Result;
use crate::gate::ReadinessGate;

/// Lookup of symbols named in trace lines.
///
/// Calls may block (file IO, index locks); they run on the blocking pool.
pub trait SymbolIndex: Send + Sync + 'static {
    type Handle: Clone + PartialEq + Send + Sync + 'static;
    type Target: Clone + Send + Sync + 'static;

    fn resolve(&self, qualified_name: &str) -> Result<Option<Self::Handle>>;

    fn resolve_enclosing_type(&self, qualified_name: &str) -> Result<Option<Self::Handle>>;

    fn location_of(&self, handle: &Self::Handle, line_number: Option<u32>)
    -> Result<Option<Self::Target>>;
}

/// Sent after the worker has processed a scheduled line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationUpdate {
    pub line: LineId,
    /// Whether a new target was installed.
    pub changed: bool,
}

struct Resolved<H, T> {
    handle: H,
    target: T,
}

struct Entry<H, T> {
    query: SymbolQuery,
    pending: AtomicBool,
    resolved: ArcSwapOption<Resolved<H, T>>,
}

type EntryOf<I> = Entry<<I as SymbolIndex>::Handle, <I as SymbolIndex>::Target>;
type QueueItem<I> = (LineId, Arc<EntryOf<I>>);

pub struct NavigationCache<I: SymbolIndex> {
    index: Arc<I>,
    gate: Arc<ReadinessGate>,
    entries: RwLock<HashMap<LineId, Arc<EntryOf<I>>>>,
    queue: mpsc::Sender<QueueItem<I>>,
    updates: broadcast::Sender<NavigationUpdate>,
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Drains the resolution queue. Run exactly one per cache.
pub struct NavigationWorker<I: SymbolIndex> {
    cache: Arc<NavigationCache<I>>,
    queue: mpsc::Receiver<QueueItem<I>>,
}

impl<I: SymbolIndex> NavigationCache<I> {
    pub fn new(
        index: Arc<I>,
        gate: Arc<ReadinessGate>,
        queue_capacity: usize,
    ) -> (Arc<Self>, NavigationWorker<I>) {
        let (queue, receiver) = mpsc::channel(queue_capacity.max(1));
        let (updates, _) = broadcast::channel(queue_capacity.max(1));
        let cache = Arc::new(Self {
            index,
            gate,
            entries: RwLock::new(HashMap::new()),
            queue,
            updates,
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        let worker = NavigationWorker {
            cache: Arc::clone(&cache),
            queue: receiver,
        };
        (cache, worker)
    }

    /// Queue a line for resolution without waiting for room.
    ///
    /// Returns `false` if the line cannot navigate, is already pending, or
    /// the queue is full (the line stays unscheduled so a later call can
    /// retry).
    pub fn schedule_resolve(&self, line: &dyn Navigable) -> bool {
        let Some((id, entry)) = self.claim(line) else {
            return false;
        };
        match self.queue.try_send((id, entry)) {
            Ok(()) => true,
            Err(err) => {
                let full = matches!(err, mpsc::error::TrySendError::Full(_));
                let (_, entry) = err.into_inner();
                entry.pending.store(false, Ordering::Release);
                self.finish_one();
                if full {
                    tracing::warn!(line = %id, "Navigation queue full; line not scheduled");
                } else {
                    tracing::debug!(line = %id, "Navigation worker stopped; line not scheduled");
                }
                false
            }
        }
    }

    /// Queue a line for resolution, waiting while the queue is full.
    ///
    /// Nothing is claimed until there is room, so dropping the future
    /// mid-wait leaves the line unscheduled. Returns `false` if the line
    /// cannot navigate, is already pending, or the worker has stopped.
    pub async fn schedule_resolve_wait<N>(&self, line: &N) -> bool
    where
        N: Navigable + Sync + ?Sized,
    {
        if line.symbol_query().is_none() {
            return false;
        }
        let Ok(permit) = self.queue.reserve().await else {
            tracing::debug!(line = %line.line_id(), "Navigation worker stopped; line not scheduled");
            return false;
        };
        let Some(item) = self.claim(line) else {
            return false;
        };
        permit.send(item);
        true
    }

    /// Schedule every navigable line of a trace, waiting for room in the
    /// queue. Returns how many were queued.
    pub async fn schedule_trace_wait(&self, trace: &TraceEvent) -> usize {
        let mut scheduled = usize::from(self.schedule_resolve_wait(&trace.header).await);
        for line in &trace.lines {
            if self.schedule_resolve_wait(line).await {
                scheduled += 1;
            }
        }
        scheduled
    }

    pub fn target(&self, line: &LineId) -> Option<I::Target> {
        self.resolved(line).map(|resolved| resolved.target.clone())
    }

    pub fn handle(&self, line: &LineId) -> Option<I::Handle> {
        self.resolved(line).map(|resolved| resolved.handle.clone())
    }

    /// Whether the line is waiting in the queue. A line the worker has
    /// already taken reads as not pending while it is being resolved.
    pub fn is_pending(&self, line: &LineId) -> bool {
        self.entries
            .read()
            .get(line)
            .is_some_and(|entry| entry.pending.load(Ordering::Acquire))
    }

    /// Forget every entry. Work already queued finishes but is not kept.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationUpdate> {
        self.updates.subscribe()
    }

    /// Resolve once nothing is queued or being resolved.
    pub async fn settled(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Mark the line pending and count it as outstanding, unless it cannot
    /// navigate or is already pending.
    fn claim<N: Navigable + ?Sized>(&self, line: &N) -> Option<QueueItem<I>> {
        let query = line.symbol_query()?;
        let id = line.line_id();
        let entry = Arc::clone(self.entries.write().entry(id).or_insert_with(|| {
            Arc::new(Entry {
                query,
                pending: AtomicBool::new(false),
                resolved: ArcSwapOption::empty(),
            })
        }));

        if entry.pending.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Some((id, entry))
    }

    fn resolved(&self, line: &LineId) -> Option<Arc<Resolved<I::Handle, I::Target>>> {
        self.entries.read().get(line)?.resolved.load_full()
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl<I: SymbolIndex> NavigationWorker<I> {
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = self.queue.recv() => item,
            };
            let Some((line, entry)) = item else { break };

            let ready = tokio::select! {
                _ = cancel.cancelled() => false,
                _ = self.cache.gate.wait_ready() => true,
            };
            if !ready {
                entry.pending.store(false, Ordering::Release);
                self.cache.finish_one();
                break;
            }

            // Cleared before resolving so a reschedule during resolution queues again.
            entry.pending.store(false, Ordering::Release);
            let changed = self.resolve(line, entry).await;
            let _ = self.cache.updates.send(NavigationUpdate { line, changed });
            self.cache.finish_one();
        }

        // Whatever is still queued will never run.
        self.queue.close();
        while let Ok((_, entry)) = self.queue.try_recv() {
            entry.pending.store(false, Ordering::Release);
            self.cache.finish_one();
        }
        tracing::debug!("Navigation worker stopped");
    }

    async fn resolve(&self, line: LineId, entry: Arc<EntryOf<I>>) -> bool {
        let index = Arc::clone(&self.cache.index);
        let result = tokio::task::spawn_blocking(move || resolve_entry(index.as_ref(), &entry)).await;
        match result {
            Ok(Ok(changed)) => changed,
            Ok(Err(err)) => {
                tracing::error!(line = %line, error = %err, "Navigation resolution failed");
                false
            }
            Err(err) => {
                tracing::error!(line = %line, error = %err, "Navigation resolution panicked");
                false
            }
        }
    }
}

fn resolve_entry<I: SymbolIndex>(index: &I, entry: &EntryOf<I>) -> Result<bool> {
    let handle = match &entry.query {
        SymbolQuery::ByName { qualified_name } => index.resolve(qualified_name)?,
        SymbolQuery::EnclosingType { qualified_name, .. } => {
            index.resolve_enclosing_type(qualified_name)?
        }
    };
    let Some(handle) = handle else {
        return Ok(false);
    };

    let current = entry.resolved.load_full();
    if current.is_some_and(|current| current.handle == handle) {
        return Ok(false);
    }

    let Some(target) = index.location_of(&handle, entry.query.line_number())? else {
        return Ok(false);
    };
    entry.resolved.store(Some(Arc::new(Resolved { handle, target })));
    Ok(true)
}
