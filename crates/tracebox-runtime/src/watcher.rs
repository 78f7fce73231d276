use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::listener::ProcessListener;
use crate::process::{ListenerId, ProcessKey, ProcessSource};
use crate::replay::{ReplayChannel, ReplaySubscription};

/// Polls a process source and attaches one listener per new process.
///
/// Announcements are replayed to late subscribers. Cancelling the token
/// detaches every live listener and closes the announcement stream.
pub struct ProcessWatcher {
    announcements: ReplayChannel<Arc<ProcessListener>>,
    task: JoinHandle<()>,
}

struct WatchLoop {
    source: Arc<dyn ProcessSource>,
    announcements: ReplayChannel<Arc<ProcessListener>>,
    tracked: HashMap<ProcessKey, Arc<ProcessListener>>,
    untrack_tx: mpsc::UnboundedSender<(ProcessKey, ListenerId)>,
    event_replay: usize,
    cancel: CancellationToken,
}

impl ProcessWatcher {
    pub fn spawn(source: Arc<dyn ProcessSource>, config: &Config, cancel: CancellationToken) -> Self {
        let announcements = ReplayChannel::new(config.replay.listeners);
        let (untrack_tx, untrack_rx) = mpsc::unbounded_channel();

        let state = WatchLoop {
            source,
            announcements: announcements.clone(),
            tracked: HashMap::new(),
            untrack_tx,
            event_replay: config.replay.events,
            cancel,
        };
        let task = tokio::spawn(state.run(config.watcher.poll_interval(), untrack_rx));

        Self {
            announcements,
            task,
        }
    }

    pub fn subscribe(&self) -> ReplaySubscription<Arc<ProcessListener>> {
        self.announcements.subscribe()
    }

    pub fn announcements(&self) -> ReplayChannel<Arc<ProcessListener>> {
        self.announcements.clone()
    }

    /// Wait for the poll loop to finish after cancellation.
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "Process watcher task failed");
        }
    }
}

impl WatchLoop {
    async fn run(
        mut self,
        poll_interval: Duration,
        mut untrack_rx: mpsc::UnboundedReceiver<(ProcessKey, ListenerId)>,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(?poll_interval, "Process watcher started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some((key, id)) = untrack_rx.recv() => self.untrack(key, id),
                _ = ticker.tick() => self.poll_once(),
            }
        }

        for (_, listener) in self.tracked.drain() {
            listener.detach();
        }
        self.announcements.close();
        tracing::debug!("Process watcher stopped");
    }

    fn poll_once(&mut self) {
        for handle in self.source.running_processes() {
            let key = handle.key();
            if handle.is_terminated() || self.tracked.contains_key(&key) {
                continue;
            }

            let untrack_tx = self.untrack_tx.clone();
            let listener = ProcessListener::attach(
                handle,
                self.event_replay,
                self.cancel.child_token(),
                move |key, id| {
                    // The loop may already be gone during shutdown.
                    let _ = untrack_tx.send((key, id));
                },
            );
            self.tracked.insert(key, Arc::clone(&listener));
            self.announcements.publish(listener);
        }
    }

    fn untrack(&mut self, key: ProcessKey, id: ListenerId) {
        // A newer listener may already track a reused key.
        if self.tracked.get(&key).is_some_and(|listener| listener.id() == id) {
            self.tracked.remove(&key);
            tracing::debug!(key = %key, "Process untracked");
        }
    }
}
