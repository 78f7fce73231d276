use chrono::{DateTime, Utc};
use tracebox_types::{ChannelTag, StoredTrace, TraceEvent};

use crate::classifier::{classify_continuation, classify_header};

/// Rebuild a trace from its stored text.
///
/// Returns `None` when the first line no longer parses as a header.
/// Continuation lines that fail to parse are dropped.
pub fn restore_trace(stored: &StoredTrace) -> Option<TraceEvent> {
    let Some(header) = classify_header(&stored.first_line) else {
        tracing::warn!(first_line = %stored.first_line, "Skipping stored trace with unparseable header");
        return None;
    };

    let lines: Vec<_> = stored
        .other_lines
        .iter()
        .filter_map(|line| {
            let parsed = classify_continuation(line);
            if parsed.is_none() {
                tracing::debug!(line = %line, "Dropping unparseable stored line");
            }
            parsed
        })
        .collect();

    let timestamp = DateTime::<Utc>::from_timestamp_millis(stored.time).unwrap_or_default();
    let mut trace = TraceEvent::new(header, lines, ChannelTag::new(stored.channel.clone()), timestamp);
    trace.extend_metadata(stored.metadata.clone());
    Some(trace)
}
