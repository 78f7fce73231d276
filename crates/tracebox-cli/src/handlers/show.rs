use crate::render::{NodeView, PlainRenderer, TargetLookup, no_targets};
use crate::types::{GroupBy, OutputFormat};
use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracebox_engine::{GroupingCriterion, group_traces};
use tracebox_runtime::{
    Config, EventStore, JsonFilePersistence, NavigationCache, ReadinessGate, SourceTreeIndex,
};
use tracebox_types::{LineId, TraceEvent};

pub fn handle(
    config: &Config,
    store_path: &Path,
    group_by: &[GroupBy],
    extra_roots: Vec<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let store = EventStore::new();
    store.load(&JsonFilePersistence::new(store_path))?;
    let traces = store.snapshot();

    let extensions = super::registry();
    let criteria = group_by
        .iter()
        .map(|group| {
            extensions
                .criterion(group.criterion_name())
                .with_context(|| format!("Unknown grouping: {}", group))
        })
        .collect::<Result<Vec<Arc<dyn GroupingCriterion>>>>()?;

    let mut roots = config.index.source_roots.clone();
    roots.extend(extra_roots);
    let navigation = if roots.is_empty() {
        None
    } else {
        Some(resolve_lines(config, roots, &traces)?)
    };
    let lookup = |id: &LineId| {
        navigation
            .as_ref()
            .and_then(|cache| cache.target(id))
            .map(|target| target.to_string())
    };
    let targets: TargetLookup<'_> = if navigation.is_some() { &lookup } else { &no_targets };

    let groups = group_traces(traces.iter().map(Arc::as_ref), &criteria);
    match format {
        OutputFormat::Json => {
            let nodes = NodeView::from_groups(&groups, targets);
            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
        OutputFormat::Plain => {
            if groups.is_empty() {
                println!("No traces captured.");
                return Ok(());
            }
            let renderer = PlainRenderer {
                extensions: &extensions,
                targets,
                color: std::io::stdout().is_terminal(),
            };
            print!("{}", renderer.groups(&groups, 0));
        }
    }
    Ok(())
}

/// Index `roots` and resolve every line of every trace against it.
fn resolve_lines(
    config: &Config,
    roots: Vec<PathBuf>,
    traces: &[Arc<TraceEvent>],
) -> Result<Arc<NavigationCache<SourceTreeIndex>>> {
    let gate = Arc::new(ReadinessGate::unavailable());
    let index = Arc::new(SourceTreeIndex::new(roots, Arc::clone(&gate)));
    let symbols = index.rescan();
    tracing::debug!(symbols, "Source roots indexed");

    let (cache, worker) = NavigationCache::new(index, gate, config.navigation.queue_capacity);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));
        let mut scheduled = 0;
        for trace in traces {
            scheduled += cache.schedule_trace_wait(trace).await;
        }
        cache.settled().await;
        tracing::debug!(scheduled, "Trace lines resolved");
        cancel.cancel();
        if let Err(err) = task.await {
            tracing::error!(error = %err, "Navigation worker failed");
        }
    });
    Ok(cache)
}
