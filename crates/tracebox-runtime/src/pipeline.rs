use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracebox_engine::ExtensionRegistry;
use tracebox_types::TraceEvent;

use crate::broker::EventBroker;
use crate::config::Config;
use crate::gate::ReadinessGate;
use crate::listener::ProcessListener;
use crate::navigation::{NavigationCache, SymbolIndex};
use crate::process::ProcessSource;
use crate::replay::{ReplayChannel, ReplaySubscription};
use crate::store::EventStore;
use crate::watcher::ProcessWatcher;

/// The running capture pipeline: watcher, broker, store and navigation.
///
/// Must be started inside a tokio runtime. Dropping it without calling
/// [`shutdown`](Self::shutdown) cancels every task without draining.
pub struct TraceBox<I: SymbolIndex> {
    cancel: CancellationToken,
    watcher_token: CancellationToken,
    navigation_token: CancellationToken,
    watcher: Option<ProcessWatcher>,
    broker: Option<EventBroker>,
    listeners: ReplayChannel<Arc<ProcessListener>>,
    traces: ReplayChannel<Arc<TraceEvent>>,
    store_consumer: Option<JoinHandle<()>>,
    navigation_consumer: Option<JoinHandle<()>>,
    navigation_task: Option<JoinHandle<()>>,
    store: Arc<EventStore>,
    navigation: Arc<NavigationCache<I>>,
    extensions: Arc<ExtensionRegistry>,
}

impl<I: SymbolIndex> TraceBox<I> {
    pub fn start(
        source: Arc<dyn ProcessSource>,
        index: Arc<I>,
        gate: Arc<ReadinessGate>,
        extensions: Arc<ExtensionRegistry>,
        config: &Config,
    ) -> Self {
        let cancel = CancellationToken::new();
        let watcher_token = cancel.child_token();
        let navigation_token = cancel.child_token();

        let watcher = ProcessWatcher::spawn(source, config, watcher_token.clone());
        let broker = EventBroker::spawn(
            watcher.subscribe(),
            Arc::clone(&extensions),
            config.replay.traces,
        );

        let store = Arc::new(EventStore::new());
        let (navigation, worker) =
            NavigationCache::new(index, gate, config.navigation.queue_capacity);

        let store_consumer = tokio::spawn(append_to_store(broker.subscribe(), Arc::clone(&store)));
        let navigation_consumer = tokio::spawn(schedule_navigation(
            broker.subscribe(),
            Arc::clone(&navigation),
            navigation_token.clone(),
        ));
        let navigation_task = tokio::spawn(worker.run(navigation_token.clone()));
        tracing::info!("Trace pipeline started");

        Self {
            cancel,
            watcher_token,
            navigation_token,
            listeners: watcher.announcements(),
            traces: broker.traces(),
            watcher: Some(watcher),
            broker: Some(broker),
            store_consumer: Some(store_consumer),
            navigation_consumer: Some(navigation_consumer),
            navigation_task: Some(navigation_task),
            store,
            navigation,
            extensions,
        }
    }

    /// Listeners attached so far (replayed) and from now on.
    pub fn subscribe_listeners(&self) -> ReplaySubscription<Arc<ProcessListener>> {
        self.listeners.subscribe()
    }

    /// Recent traces (replayed) and every trace captured from now on.
    pub fn subscribe_traces(&self) -> ReplaySubscription<Arc<TraceEvent>> {
        self.traces.subscribe()
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn navigation(&self) -> &Arc<NavigationCache<I>> {
        &self.navigation
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// Empty the store and forget resolved navigation targets.
    pub fn clear(&self) {
        self.store.clear();
        self.navigation.clear();
    }

    /// Stop watching, let in-flight traces reach the store, then stop.
    pub async fn shutdown(mut self) {
        self.watcher_token.cancel();
        if let Some(watcher) = self.watcher.take() {
            watcher.join().await;
        }
        if let Some(broker) = self.broker.take() {
            broker.join().await;
        }
        if let Some(consumer) = self.store_consumer.take()
            && let Err(err) = consumer.await
        {
            tracing::error!(error = %err, "Store consumer failed");
        }

        // Scheduling may be parked on a full queue behind an index that never
        // became ready; cancelling releases it.
        self.navigation_token.cancel();
        if let Some(consumer) = self.navigation_consumer.take()
            && let Err(err) = consumer.await
        {
            tracing::error!(error = %err, "Navigation scheduler failed");
        }
        if let Some(task) = self.navigation_task.take()
            && let Err(err) = task.await
        {
            tracing::error!(error = %err, "Navigation worker failed");
        }
        tracing::info!(traces = self.store.len(), "Trace pipeline stopped");
    }
}

impl<I: SymbolIndex> Drop for TraceBox<I> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn append_to_store(mut traces: ReplaySubscription<Arc<TraceEvent>>, store: Arc<EventStore>) {
    while let Some(trace) = traces.recv().await {
        store.append(trace);
    }
}

async fn schedule_navigation<I: SymbolIndex>(
    mut traces: ReplaySubscription<Arc<TraceEvent>>,
    navigation: Arc<NavigationCache<I>>,
    cancel: CancellationToken,
) {
    loop {
        let trace = tokio::select! {
            _ = cancel.cancelled() => None,
            trace = traces.recv() => trace,
        };
        let Some(trace) = trace else { break };
        // Waits for room rather than dropping lines while the index is not ready.
        let scheduled = tokio::select! {
            _ = cancel.cancelled() => break,
            scheduled = navigation.schedule_trace_wait(&trace) => scheduled,
        };
        tracing::trace!(scheduled, "Navigation scheduled");
    }
}
