use std::sync::Arc;
use tracebox_types::{PROCESS_NAME_KEY, TraceEvent};

/// Splits traces into named buckets for display.
pub trait GroupingCriterion: Send + Sync {
    /// Lower nests outermost when criteria are applied in registry order
    fn priority(&self) -> i32;

    /// Stable identifier used on the command line
    fn name(&self) -> &'static str;

    /// Human-readable title for group headings
    fn label(&self) -> &'static str;

    fn key(&self, trace: &TraceEvent) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GroupByExceptionClass;

impl GroupingCriterion for GroupByExceptionClass {
    fn priority(&self) -> i32 {
        0
    }

    fn name(&self) -> &'static str {
        "exception"
    }

    fn label(&self) -> &'static str {
        "Exception class"
    }

    fn key(&self, trace: &TraceEvent) -> String {
        trace.header.qualified_name.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GroupByFirstLine;

impl GroupingCriterion for GroupByFirstLine {
    fn priority(&self) -> i32 {
        1
    }

    fn name(&self) -> &'static str {
        "first-line"
    }

    fn label(&self) -> &'static str {
        "First line"
    }

    fn key(&self, trace: &TraceEvent) -> String {
        trace.header.text.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GroupByProcess;

impl GroupingCriterion for GroupByProcess {
    fn priority(&self) -> i32 {
        2
    }

    fn name(&self) -> &'static str {
        "process"
    }

    fn label(&self) -> &'static str {
        "Process"
    }

    fn key(&self, trace: &TraceEvent) -> String {
        trace
            .metadata_value(PROCESS_NAME_KEY)
            .unwrap_or("unknown process")
            .to_string()
    }
}

/// Node of a grouped trace listing.
#[derive(Debug, PartialEq, Eq)]
pub enum TraceGroup<'a> {
    Group {
        label: &'static str,
        key: String,
        children: Vec<TraceGroup<'a>>,
    },
    Trace(&'a TraceEvent),
}

impl TraceGroup<'_> {
    /// Number of traces below this node.
    pub fn trace_count(&self) -> usize {
        match self {
            TraceGroup::Trace(_) => 1,
            TraceGroup::Group { children, .. } => children.iter().map(TraceGroup::trace_count).sum(),
        }
    }
}

/// Nest traces by each criterion in turn.
///
/// Keys appear in the order they are first seen; traces keep their input
/// order within a group. With no criteria the traces come back flat.
pub fn group_traces<'a, I>(traces: I, criteria: &[Arc<dyn GroupingCriterion>]) -> Vec<TraceGroup<'a>>
where
    I: IntoIterator<Item = &'a TraceEvent>,
{
    let traces: Vec<&'a TraceEvent> = traces.into_iter().collect();
    group_level(traces, criteria)
}

fn group_level<'a>(
    traces: Vec<&'a TraceEvent>,
    criteria: &[Arc<dyn GroupingCriterion>],
) -> Vec<TraceGroup<'a>> {
    let Some((criterion, rest)) = criteria.split_first() else {
        return traces.into_iter().map(TraceGroup::Trace).collect();
    };

    let mut buckets: Vec<(String, Vec<&'a TraceEvent>)> = Vec::new();
    for trace in traces {
        let key = criterion.key(trace);
        match buckets.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(trace),
            None => buckets.push((key, vec![trace])),
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| TraceGroup::Group {
            label: criterion.label(),
            key,
            children: group_level(members, rest),
        })
        .collect()
}
