// Engine - pure stack-trace logic (classification, reassembly, grouping)
// This layer sits between raw process output (types) and the async runtime

pub mod aggregator;
pub mod classifier;
pub mod extensions;
pub mod grouping;
mod restore;

pub use aggregator::{Aggregated, Clock, TraceAggregator};
pub use classifier::{classify, classify_continuation, classify_header, enclosing_type, parse_any};
pub use extensions::{DisplayPart, ExtensionRegistry, MetadataContributor, ProcessNameContributor};
pub use grouping::{
    GroupByExceptionClass, GroupByFirstLine, GroupByProcess, GroupingCriterion, TraceGroup,
    group_traces,
};
pub use restore::restore_trace;
