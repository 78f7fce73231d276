use crate::host::{ChildProcess, ChildProcessSource};
use crate::render::{PlainRenderer, TraceView, no_targets};
use crate::types::OutputFormat;
use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracebox_engine::ExtensionRegistry;
use tracebox_runtime::{
    Config, JsonFilePersistence, ProcessListener, ProcessSource, ReadinessGate, ReplaySubscription,
    SourceTreeIndex, SourceWatch, TraceBox, TracePersistence,
};
use tracebox_types::{ChannelTag, RawEvent, StoredTrace, TraceEvent};

pub fn handle(
    config: &Config,
    store_path: &Path,
    command: &[String],
    raw: bool,
    format: OutputFormat,
) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        anyhow::bail!("No program given");
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let index = Arc::new(SourceTreeIndex::new(
            config.index.source_roots.clone(),
            Arc::new(ReadinessGate::unavailable()),
        ));
        let _watch = start_index(&index, config)?;

        let extensions = Arc::new(super::registry());
        let source = ChildProcessSource::new();
        let tracebox = TraceBox::start(
            Arc::clone(&source) as Arc<dyn ProcessSource>,
            Arc::clone(&index),
            Arc::clone(index.gate()),
            Arc::clone(&extensions),
            config,
        );

        let printer = tokio::spawn(print_traces(
            tracebox.subscribe_traces(),
            Arc::clone(&extensions),
            format,
        ));
        let echo = raw.then(|| tokio::spawn(echo_output(tracebox.subscribe_listeners())));

        let (child, status) = ChildProcess::spawn(program, args)?;
        source.add(child);
        let code = match status.await {
            Ok(status) => status.code().unwrap_or(1),
            Err(_) => 1,
        };

        let store = Arc::clone(tracebox.store());
        tracebox.shutdown().await;
        for task in [Some(printer), echo].into_iter().flatten() {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Output task failed");
            }
        }

        save_captured(&store.to_stored().traces, store_path)?;
        tracing::info!(traces = store.len(), store = %store_path.display(), "Captured traces saved");
        Ok::<_, anyhow::Error>(code)
    })
}

/// Index the configured source roots in the background and keep them fresh.
fn start_index(
    index: &Arc<SourceTreeIndex>,
    config: &Config,
) -> Result<Option<SourceWatch>> {
    let scanner = Arc::clone(index);
    tokio::task::spawn_blocking(move || scanner.rescan());
    if config.index.source_roots.is_empty() {
        return Ok(None);
    }
    Ok(Some(index.watch(config.index.poll_interval())?))
}

async fn print_traces(
    mut traces: ReplaySubscription<Arc<TraceEvent>>,
    extensions: Arc<ExtensionRegistry>,
    format: OutputFormat,
) {
    let color = std::io::stdout().is_terminal();
    while let Some(trace) = traces.recv().await {
        match format {
            OutputFormat::Plain => {
                let renderer = PlainRenderer {
                    extensions: &extensions,
                    targets: &no_targets,
                    color,
                };
                println!("{}", renderer.trace(&trace, 0));
            }
            OutputFormat::Json => match serde_json::to_string(&TraceView::new(&trace, &no_targets)) {
                Ok(line) => println!("{}", line),
                Err(err) => tracing::error!(error = %err, "Failed to serialize trace"),
            },
        }
    }
}

async fn echo_output(mut listeners: ReplaySubscription<Arc<ProcessListener>>) {
    let mut echoes: Vec<JoinHandle<()>> = Vec::new();
    while let Some(listener) = listeners.recv().await {
        let mut events = listener.subscribe();
        echoes.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let RawEvent::Text { content, channel } = event {
                    if channel.as_str() == ChannelTag::STDERR {
                        eprintln!("{}", content);
                    } else {
                        println!("{}", content);
                    }
                }
            }
        }));
    }
    for echo in echoes {
        let _ = echo.await;
    }
}

/// Append this run's traces to whatever the store file already holds.
fn save_captured(captured: &[StoredTrace], store_path: &Path) -> Result<()> {
    let persistence = JsonFilePersistence::new(store_path);
    let mut stored = persistence.load()?;
    stored.traces.extend_from_slice(captured);
    persistence.save(&stored)?;
    Ok(())
}
