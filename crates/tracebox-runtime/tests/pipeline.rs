use std::sync::Arc;
use std::time::Duration;
use tracebox_engine::ExtensionRegistry;
use tracebox_runtime::{
    Config, GIT_REVISION_KEY, GitRevisionContributor, ProcessSource, ReadinessGate,
    ReplaySubscription, StoreChange, TraceBox,
};
use tracebox_testing::assertions::wait_for;
use tracebox_testing::fixtures::{MULTIPLE_TRACES, SIMPLE_TRACE};
use tracebox_testing::{FakeProcessSource, FakeSymbolIndex};
use tracebox_types::{Navigable, PROCESS_NAME_KEY, TraceEvent, TraceLine};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.watcher.poll_interval_ms = 5;
    config
}

fn start(
    source: &Arc<FakeProcessSource>,
    index: FakeSymbolIndex,
    extensions: ExtensionRegistry,
) -> TraceBox<FakeSymbolIndex> {
    TraceBox::start(
        Arc::clone(source) as Arc<dyn ProcessSource>,
        Arc::new(index),
        Arc::new(ReadinessGate::ready()),
        Arc::new(extensions),
        &fast_config(),
    )
}

fn start_with(
    source: &Arc<FakeProcessSource>,
    index: FakeSymbolIndex,
    gate: ReadinessGate,
    config: &Config,
) -> TraceBox<FakeSymbolIndex> {
    TraceBox::start(
        Arc::clone(source) as Arc<dyn ProcessSource>,
        Arc::new(index),
        Arc::new(gate),
        Arc::new(ExtensionRegistry::with_defaults()),
        config,
    )
}

async fn next_trace(traces: &mut ReplaySubscription<Arc<TraceEvent>>) -> Arc<TraceEvent> {
    tokio::time::timeout(Duration::from_secs(5), traces.recv())
        .await
        .expect("trace published")
        .expect("stream open")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trace_flows_to_store_and_navigation() {
    let source = FakeProcessSource::new();
    let index = FakeSymbolIndex::with_symbols([
        "java.lang.RuntimeException",
        "com.tsarev.stacktracebox.MainKt",
    ]);
    let tracebox = start(&source, index, ExtensionRegistry::with_defaults());
    let mut changes = tracebox.store().subscribe();

    let process = source.start("app");
    wait_for("listener attached", || process.listener_count() == 1).await;

    process.emit_lines(SIMPLE_TRACE, "stderr");
    wait_for("trace stored", || tracebox.store().len() == 1).await;
    assert!(matches!(changes.recv().await, Ok(StoreChange::Appended(_))));

    let trace = tracebox.store().snapshot().remove(0);
    assert_eq!(trace.header.qualified_name, "java.lang.RuntimeException");
    assert_eq!(trace.lines.len(), 4);
    assert_eq!(trace.metadata_value(PROCESS_NAME_KEY), Some("app"));

    let navigation = Arc::clone(tracebox.navigation());
    let ids: Vec<_> = trace.navigables().map(|line| line.line_id()).collect();
    wait_for("every line resolved", || {
        ids.iter().all(|id| navigation.target(id).is_some())
    })
    .await;

    let TraceLine::Frame(frame) = &trace.lines[0] else {
        panic!("Expected a frame");
    };
    assert_eq!(navigation.target(&frame.id).map(|t| t.line), Some(13));

    tracebox.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_processes_are_aggregated_independently() {
    let source = FakeProcessSource::new();
    let tracebox = start(&source, FakeSymbolIndex::new(), ExtensionRegistry::with_defaults());
    let mut traces = tracebox.subscribe_traces();

    let first = source.start("first");
    let second = source.start("second");
    wait_for("listeners attached", || {
        first.listener_count() == 1 && second.listener_count() == 1
    })
    .await;

    // Interleave two processes line by line; neither may break the other's trace.
    first.emit_stderr("a.FirstException: one");
    second.emit_stderr("b.SecondException: two");
    first.emit_stderr("\tat a.X.y(X.java:1)");
    second.emit_stderr("\tat b.Y.z(Y.java:2)");
    first.terminate();
    second.terminate();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let trace = tokio::time::timeout(Duration::from_secs(5), traces.recv())
            .await
            .expect("trace published")
            .expect("stream open");
        seen.push((
            trace.metadata_value(PROCESS_NAME_KEY).unwrap_or_default().to_string(),
            trace.header.qualified_name.clone(),
            trace.lines.len(),
        ));
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("first".to_string(), "a.FirstException".to_string(), 1),
            ("second".to_string(), "b.SecondException".to_string(), 1),
        ]
    );

    tracebox.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_flushes_open_traces_and_closes_streams() {
    let source = FakeProcessSource::new();
    let mut extensions = ExtensionRegistry::with_defaults();
    extensions.add_contributor(Arc::new(GitRevisionContributor::with_revision("abc123")));
    let tracebox = start(&source, FakeSymbolIndex::new(), extensions);
    let mut listeners = tracebox.subscribe_listeners();
    let mut traces = tracebox.subscribe_traces();

    let process = source.start("app");
    let announced = listeners.recv().await.expect("listener announced");
    assert_eq!(announced.display_name(), "app");

    process.emit_lines(MULTIPLE_TRACES, "stderr");
    let store = Arc::clone(tracebox.store());
    // The second trace is still open: only shutdown closes it.
    wait_for("first trace stored", || store.len() == 1).await;

    tracebox.shutdown().await;

    assert_eq!(store.len(), 2);
    let last = store.snapshot().pop().unwrap();
    assert_eq!(last.header.qualified_name, "some.OtherException");
    assert_eq!(last.metadata_value(GIT_REVISION_KEY), Some("abc123"));
    assert!(announced.is_terminated());
    assert_eq!(process.listener_count(), 0);

    let mut remaining = 0;
    while traces.recv().await.is_some() {
        remaining += 1;
    }
    assert_eq!(remaining, 2);
    assert!(listeners.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_terminated_process_is_untracked_and_new_one_attached() {
    let source = FakeProcessSource::new();
    let tracebox = start(&source, FakeSymbolIndex::new(), ExtensionRegistry::with_defaults());
    let mut listeners = tracebox.subscribe_listeners();

    let first = source.start("first");
    let first_listener = listeners.recv().await.unwrap();
    first.terminate();
    source.reap();
    assert!(first_listener.is_terminated());

    let second = source.start("second");
    let second_listener = listeners.recv().await.unwrap();
    assert_eq!(second_listener.display_name(), "second");
    assert_ne!(first_listener.key(), second_listener.key());
    wait_for("second attached", || second.listener_count() == 1).await;

    tracebox.clear();
    assert!(tracebox.store().is_empty());
    tracebox.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_listener_subscriber_sees_running_process() {
    let source = FakeProcessSource::new();
    let tracebox = start(&source, FakeSymbolIndex::new(), ExtensionRegistry::with_defaults());

    let process = source.start("app");
    wait_for("listener attached", || process.listener_count() == 1).await;

    let mut listeners = tracebox.subscribe_listeners();
    let listener = tokio::time::timeout(Duration::from_secs(5), listeners.recv())
        .await
        .expect("listener replayed")
        .expect("stream open");
    assert_eq!(listener.display_name(), "app");
    assert!(!listener.is_terminated());

    tracebox.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_trace_subscriber_gets_bounded_replay_then_live() {
    let source = FakeProcessSource::new();
    let mut config = fast_config();
    config.replay.traces = 3;
    let tracebox = start_with(&source, FakeSymbolIndex::new(), ReadinessGate::ready(), &config);

    let first = source.start("first");
    wait_for("first attached", || first.listener_count() == 1).await;
    // Each header closes the previous trace; pace them so the store keeps up.
    for n in 1..=5 {
        first.emit_stderr(&format!("a.Fail{n}Exception: boom"));
        wait_for("previous trace stored", || tracebox.store().len() == n - 1).await;
    }
    first.terminate();
    wait_for("five traces stored", || tracebox.store().len() == 5).await;

    let mut traces = tracebox.subscribe_traces();
    let mut replayed = Vec::new();
    for _ in 0..3 {
        replayed.push(next_trace(&mut traces).await.header.qualified_name.clone());
    }
    assert_eq!(
        replayed,
        ["a.Fail3Exception", "a.Fail4Exception", "a.Fail5Exception"]
    );

    let second = source.start("second");
    wait_for("second attached", || second.listener_count() == 1).await;
    second.emit_stderr("a.Fail6Exception: boom");
    second.terminate();
    assert_eq!(next_trace(&mut traces).await.header.qualified_name, "a.Fail6Exception");

    tracebox.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reused_key_gets_fresh_listener() {
    let source = FakeProcessSource::new();
    let tracebox = start(&source, FakeSymbolIndex::new(), ExtensionRegistry::with_defaults());
    let mut listeners = tracebox.subscribe_listeners();

    let first = source.start_with_key(7, "first");
    let first_listener = listeners.recv().await.unwrap();
    first.terminate();
    assert!(first_listener.is_terminated());

    let second = source.start_with_key(7, "second");
    let second_listener = tokio::time::timeout(Duration::from_secs(5), listeners.recv())
        .await
        .expect("reused key adopted")
        .expect("stream open");
    assert_eq!(second_listener.key(), first_listener.key());
    assert_ne!(second_listener.id(), first_listener.id());
    assert_eq!(second_listener.display_name(), "second");
    assert!(!second_listener.is_terminated());
    wait_for("second attached", || second.listener_count() == 1).await;
    assert_eq!(first.listener_count(), 0);

    tracebox.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_wait_for_index_and_shutdown_does_not_stall() {
    let source = FakeProcessSource::new();
    let mut config = fast_config();
    config.navigation.queue_capacity = 1;
    let names: Vec<String> = (1..=4).map(|n| format!("a.Fail{n}Exception")).collect();
    let index = FakeSymbolIndex::with_symbols(names.iter().map(String::as_str));
    let gate = ReadinessGate::unavailable();
    let tracebox = start_with(&source, index, gate, &config);

    let process = source.start("app");
    wait_for("listener attached", || process.listener_count() == 1).await;
    for name in &names {
        process.emit_stderr(&format!("{name}: boom"));
    }
    process.terminate();
    wait_for("four traces stored", || tracebox.store().len() == 4).await;

    // The index never becomes ready and the queue is full; shutdown still ends.
    tokio::time::timeout(Duration::from_secs(5), tracebox.shutdown())
        .await
        .expect("shutdown completes");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lines_beyond_queue_capacity_resolve_once_ready() {
    let source = FakeProcessSource::new();
    let mut config = fast_config();
    config.navigation.queue_capacity = 1;
    let names: Vec<String> = (1..=4).map(|n| format!("a.Fail{n}Exception")).collect();
    let gate = Arc::new(ReadinessGate::unavailable());
    let tracebox = TraceBox::start(
        Arc::clone(&source) as Arc<dyn ProcessSource>,
        Arc::new(FakeSymbolIndex::with_symbols(names.iter().map(String::as_str))),
        Arc::clone(&gate),
        Arc::new(ExtensionRegistry::with_defaults()),
        &config,
    );

    let process = source.start("app");
    wait_for("listener attached", || process.listener_count() == 1).await;
    for name in &names {
        process.emit_stderr(&format!("{name}: boom"));
    }
    process.terminate();
    wait_for("four traces stored", || tracebox.store().len() == 4).await;

    gate.mark_ready();
    let navigation = Arc::clone(tracebox.navigation());
    let ids: Vec<_> = tracebox
        .store()
        .snapshot()
        .iter()
        .map(|trace| trace.header.line_id())
        .collect();
    wait_for("every header resolved", || {
        ids.iter().all(|id| navigation.target(id).is_some())
    })
    .await;

    tracebox.shutdown().await;
}
