use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracebox_engine::{Aggregated, ExtensionRegistry, TraceAggregator};
use tracebox_types::{PROCESS_NAME_KEY, RawEvent, TraceEvent};

use crate::listener::ProcessListener;
use crate::replay::{ReplayChannel, ReplaySubscription};

/// Fans every announced listener into one shared stream of traces.
///
/// Each process gets its own task and aggregator, so a stalled process never
/// holds up another. The trace stream closes once the announcement stream has
/// ended and every per-process task has finished.
pub struct EventBroker {
    traces: ReplayChannel<Arc<TraceEvent>>,
    task: JoinHandle<()>,
}

impl EventBroker {
    pub fn spawn(
        announcements: ReplaySubscription<Arc<ProcessListener>>,
        extensions: Arc<ExtensionRegistry>,
        replay: usize,
    ) -> Self {
        let traces = ReplayChannel::new(replay);
        let task = tokio::spawn(run(announcements, extensions, traces.clone()));
        Self { traces, task }
    }

    pub fn subscribe(&self) -> ReplaySubscription<Arc<TraceEvent>> {
        self.traces.subscribe()
    }

    pub fn traces(&self) -> ReplayChannel<Arc<TraceEvent>> {
        self.traces.clone()
    }

    pub async fn join(self) {
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "Event broker task failed");
        }
    }
}

async fn run(
    mut announcements: ReplaySubscription<Arc<ProcessListener>>,
    extensions: Arc<ExtensionRegistry>,
    traces: ReplayChannel<Arc<TraceEvent>>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            listener = announcements.recv() => match listener {
                Some(listener) => {
                    tasks.spawn(aggregate_process(listener, Arc::clone(&extensions), traces.clone()));
                }
                None => break,
            },
            Some(result) = tasks.join_next(), if !tasks.is_empty() => log_join(result),
        }
    }

    while let Some(result) = tasks.join_next().await {
        log_join(result);
    }
    traces.close();
    tracing::debug!("Event broker drained");
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "Aggregation task failed");
    }
}

async fn aggregate_process(
    listener: Arc<ProcessListener>,
    extensions: Arc<ExtensionRegistry>,
    traces: ReplayChannel<Arc<TraceEvent>>,
) {
    let mut events = listener.subscribe();
    let token = listener.token();
    let mut aggregator = TraceAggregator::new();
    let publish = |mut trace: TraceEvent| {
        trace.insert_metadata(PROCESS_NAME_KEY, listener.display_name());
        extensions.apply_metadata(&mut trace);
        tracing::debug!(
            process = %listener.display_name(),
            exception = %trace.header.qualified_name,
            lines = trace.line_count(),
            "Trace captured"
        );
        traces.publish(Arc::new(trace));
    };

    loop {
        // Pending events win over cancellation so the final ProcessEnd is seen.
        let event = tokio::select! {
            biased;
            event = events.recv() => event,
            _ = token.cancelled() => None,
        };
        let Some(event) = event else { break };
        let is_end = matches!(event, RawEvent::ProcessEnd);

        for output in aggregator.push(event) {
            if let Aggregated::Trace(trace) = output {
                publish(trace);
            }
        }
        if is_end {
            break;
        }
    }

    for output in aggregator.finish() {
        if let Aggregated::Trace(trace) = output {
            publish(trace);
        }
    }
}
