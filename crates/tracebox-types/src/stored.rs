use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::{Navigable, TraceEvent};

/// Serializable shape of a captured trace.
///
/// Only raw text is kept; lines are re-classified when the trace is loaded
/// back, so improvements to the classifier apply to old records too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrace {
    pub first_line: String,
    #[serde(default)]
    pub other_lines: Vec<String>,
    pub channel: String,
    /// Capture time in milliseconds since the Unix epoch.
    pub time: i64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Ordered list of stored traces, as written by persistence backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTraces {
    #[serde(default)]
    pub traces: Vec<StoredTrace>,
}

impl From<&TraceEvent> for StoredTrace {
    fn from(trace: &TraceEvent) -> Self {
        StoredTrace {
            first_line: trace.header.text.clone(),
            other_lines: trace.lines.iter().map(|line| line.text().to_string()).collect(),
            channel: trace.channel.as_str().to_string(),
            time: trace.timestamp.timestamp_millis(),
            metadata: trace.metadata().clone(),
        }
    }
}
