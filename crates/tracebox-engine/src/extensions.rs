use std::collections::BTreeMap;
use std::sync::Arc;
use tracebox_types::{PROCESS_NAME_KEY, TraceEvent};

use crate::grouping::{GroupByExceptionClass, GroupByFirstLine, GroupByProcess, GroupingCriterion};

/// Labelled fragment shown next to a trace, e.g. `process: app`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayPart {
    pub label: String,
    pub value: String,
}

impl DisplayPart {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Attaches extra facts to traces as they are published.
///
/// Responsibilities:
/// - Compute metadata entries for a freshly aggregated trace
/// - Describe a trace's metadata for display
///
/// Entries are merged additively: a key already present on the trace wins.
pub trait MetadataContributor: Send + Sync {
    /// Lower runs first
    fn priority(&self) -> i32;

    fn name(&self) -> &'static str;

    fn metadata(&self, _trace: &TraceEvent) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn display_parts(&self, _trace: &TraceEvent) -> Vec<DisplayPart> {
        Vec::new()
    }
}

/// Shows the process name the broker stored under [`PROCESS_NAME_KEY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessNameContributor;

impl MetadataContributor for ProcessNameContributor {
    fn priority(&self) -> i32 {
        0
    }

    fn name(&self) -> &'static str {
        "process"
    }

    fn display_parts(&self, trace: &TraceEvent) -> Vec<DisplayPart> {
        trace
            .metadata_value(PROCESS_NAME_KEY)
            .map(|name| vec![DisplayPart::new("process", name)])
            .unwrap_or_default()
    }
}

/// Priority-ordered set of metadata contributors and grouping criteria.
///
/// Owned and passed around by `Arc`; there is no global registry.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    contributors: Vec<Arc<dyn MetadataContributor>>,
    criteria: Vec<Arc<dyn GroupingCriterion>>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field(
                "contributors",
                &self.contributors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field(
                "criteria",
                &self.criteria.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in contributor and criteria.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add_contributor(Arc::new(ProcessNameContributor));
        registry.add_criterion(Arc::new(GroupByExceptionClass));
        registry.add_criterion(Arc::new(GroupByFirstLine));
        registry.add_criterion(Arc::new(GroupByProcess));
        registry
    }

    pub fn add_contributor(&mut self, contributor: Arc<dyn MetadataContributor>) {
        self.contributors.push(contributor);
        // sort_by_key is stable, so registration order breaks ties
        self.contributors.sort_by_key(|c| c.priority());
    }

    pub fn add_criterion(&mut self, criterion: Arc<dyn GroupingCriterion>) {
        self.criteria.push(criterion);
        self.criteria.sort_by_key(|c| c.priority());
    }

    pub fn contributors(&self) -> &[Arc<dyn MetadataContributor>] {
        &self.contributors
    }

    pub fn criteria(&self) -> &[Arc<dyn GroupingCriterion>] {
        &self.criteria
    }

    pub fn criterion(&self, name: &str) -> Option<Arc<dyn GroupingCriterion>> {
        self.criteria.iter().find(|c| c.name() == name).cloned()
    }

    /// Run every contributor over the trace in priority order.
    pub fn apply_metadata(&self, trace: &mut TraceEvent) {
        for contributor in &self.contributors {
            let entries = contributor.metadata(trace);
            if !entries.is_empty() {
                tracing::debug!(
                    contributor = contributor.name(),
                    entries = entries.len(),
                    "metadata contributed"
                );
            }
            trace.extend_metadata(entries);
        }
    }

    pub fn display_parts(&self, trace: &TraceEvent) -> Vec<DisplayPart> {
        self.contributors
            .iter()
            .flat_map(|c| c.display_parts(trace))
            .collect()
    }
}
