use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator for one of a process's independent output streams.
///
/// Hosts report whatever name they use for a stream ("stdout", "stderr",
/// "system"); the aggregation state for each tag is kept separately so
/// interleaved streams never merge their trace lines.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTag(String);

impl ChannelTag {
    pub const STDOUT: &'static str = "stdout";
    pub const STDERR: &'static str = "stderr";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn stdout() -> Self {
        Self::new(Self::STDOUT)
    }

    pub fn stderr() -> Self {
        Self::new(Self::STDERR)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Event produced by a process listener, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A chunk of text written by the process on one of its streams.
    Text { content: String, channel: ChannelTag },
    /// Emitted once when a listener attaches to a process.
    ProcessStart,
    /// Emitted once when the process terminates (or the listener detaches).
    ProcessEnd,
}

impl RawEvent {
    pub fn text(content: impl Into<String>, channel: impl Into<ChannelTag>) -> Self {
        RawEvent::Text {
            content: content.into(),
            channel: channel.into(),
        }
    }

    pub fn is_control(&self) -> bool {
        !matches!(self, RawEvent::Text { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_tag_ordering_is_lexical() {
        let mut tags = vec![ChannelTag::stdout(), ChannelTag::stderr(), ChannelTag::new("system")];
        tags.sort();
        let names: Vec<_> = tags.iter().map(ChannelTag::as_str).collect();
        assert_eq!(names, vec!["stderr", "stdout", "system"]);
    }

    #[test]
    fn test_control_events() {
        assert!(RawEvent::ProcessStart.is_control());
        assert!(RawEvent::ProcessEnd.is_control());
        assert!(!RawEvent::text("hello", "stdout").is_control());
    }
}
