use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::line::{ExceptionHeader, Navigable, TraceLine};
use super::raw::ChannelTag;

/// A reassembled stack trace: one header plus its caused-by and frame lines.
///
/// Metadata is additive-only: extensions may attach new facts but never
/// overwrite or remove existing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub header: ExceptionHeader,
    pub lines: Vec<TraceLine>,
    pub channel: ChannelTag,
    pub timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
}

impl TraceEvent {
    pub fn new(
        header: ExceptionHeader,
        lines: Vec<TraceLine>,
        channel: ChannelTag,
        timestamp: DateTime<Utc>,
    ) -> Self {
        debug_assert!(lines.iter().all(TraceLine::is_continuation));
        Self {
            header,
            lines,
            channel,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Attach a metadata entry. Returns `false` (and keeps the old value) if
    /// the key is already present.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.metadata.contains_key(&key) {
            return false;
        }
        self.metadata.insert(key, value.into());
        true
    }

    pub fn extend_metadata<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.insert_metadata(key, value);
        }
    }

    /// Header plus every following line, in capture order.
    pub fn navigables(&self) -> impl Iterator<Item = &dyn Navigable> {
        std::iter::once(&self.header as &dyn Navigable)
            .chain(self.lines.iter().map(|line| line as &dyn Navigable))
    }

    pub fn line_count(&self) -> usize {
        self.lines.len() + 1
    }

    /// Full trace text, one line per captured line.
    pub fn text(&self) -> String {
        let mut text = self.header.text.clone();
        for line in &self.lines {
            text.push('\n');
            text.push_str(line.text());
        }
        text
    }
}
