use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracebox_types::{ChannelTag, ExceptionHeader, RawEvent, TraceEvent, TraceLine};

use crate::classifier::{classify_continuation, classify_header};

/// Source of emission timestamps.
pub type Clock = fn() -> DateTime<Utc>;

/// Output of the aggregation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregated {
    Trace(TraceEvent),
    ProcessStart,
    ProcessEnd,
}

/// Trace currently being recorded on one channel.
#[derive(Debug)]
struct PendingTrace {
    header: ExceptionHeader,
    lines: Vec<TraceLine>,
}

/// Reassembles stack traces from raw process output.
///
/// State is kept per channel tag: a channel is recording while it holds a
/// pending trace, and idle otherwise. Text is split into lines; an idle
/// channel waits for an exception header, a recording channel appends
/// `Caused by:`/`at` lines until some other line shows up. That line closes
/// the trace and is then given one more chance as the header of the next
/// trace. Control events close every open trace before being passed on.
#[derive(Debug)]
pub struct TraceAggregator {
    channels: BTreeMap<ChannelTag, PendingTrace>,
    clock: Clock,
}

impl Default for TraceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceAggregator {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            channels: BTreeMap::new(),
            clock,
        }
    }

    pub fn is_recording(&self, channel: &ChannelTag) -> bool {
        self.channels.contains_key(channel)
    }

    /// Feed one raw event, returning everything it completes, in order.
    pub fn push(&mut self, event: RawEvent) -> Vec<Aggregated> {
        let mut out = Vec::new();
        match event {
            RawEvent::Text { content, channel } => {
                for line in content.split('\n') {
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.analyze_line(line, &channel, &mut out);
                }
            }
            RawEvent::ProcessStart => {
                self.flush_all(&mut out);
                out.push(Aggregated::ProcessStart);
            }
            RawEvent::ProcessEnd => {
                self.flush_all(&mut out);
                out.push(Aggregated::ProcessEnd);
            }
        }
        out
    }

    /// Close every open trace, e.g. when the input ends without a control event.
    pub fn finish(&mut self) -> Vec<Aggregated> {
        let mut out = Vec::new();
        self.flush_all(&mut out);
        out
    }

    fn analyze_line(&mut self, line: &str, channel: &ChannelTag, out: &mut Vec<Aggregated>) {
        if let Some(pending) = self.channels.get_mut(channel) {
            if let Some(continuation) = classify_continuation(line) {
                pending.lines.push(continuation);
                return;
            }
            if let Some(pending) = self.channels.remove(channel) {
                out.push(Aggregated::Trace(self.complete(pending, channel.clone())));
            }
        }

        if let Some(header) = classify_header(line) {
            tracing::trace!(channel = %channel, exception = %header.qualified_name, "trace started");
            self.channels.insert(
                channel.clone(),
                PendingTrace {
                    header,
                    lines: Vec::new(),
                },
            );
        }
    }

    fn flush_all(&mut self, out: &mut Vec<Aggregated>) {
        let channels = std::mem::take(&mut self.channels);
        for (channel, pending) in channels {
            out.push(Aggregated::Trace(self.complete(pending, channel)));
        }
    }

    fn complete(&self, pending: PendingTrace, channel: ChannelTag) -> TraceEvent {
        TraceEvent::new(pending.header, pending.lines, channel, (self.clock)())
    }
}
