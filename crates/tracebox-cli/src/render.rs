use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::collections::BTreeMap;
use tracebox_engine::{ExtensionRegistry, TraceGroup};
use tracebox_types::{LineId, Navigable, TraceEvent, TraceLine};

/// Looks up where a line resolved to, if anywhere.
pub type TargetLookup<'a> = &'a dyn Fn(&LineId) -> Option<String>;

pub fn no_targets(_: &LineId) -> Option<String> {
    None
}

pub struct PlainRenderer<'a> {
    pub extensions: &'a ExtensionRegistry,
    pub targets: TargetLookup<'a>,
    pub color: bool,
}

impl PlainRenderer<'_> {
    pub fn trace(&self, trace: &TraceEvent, indent: usize) -> String {
        let pad = " ".repeat(indent);
        let mut out = String::new();

        let time = trace.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let header = &trace.header.text;
        let parts = self
            .extensions
            .display_parts(trace)
            .into_iter()
            .map(|part| format!("{}: {}", part.label, part.value))
            .collect::<Vec<_>>();

        out.push_str(&pad);
        if self.color {
            out.push_str(&format!("{} {}", time.dimmed(), header.red().bold()));
        } else {
            out.push_str(&format!("{} {}", time, header));
        }
        if !parts.is_empty() {
            let parts = format!("({})", parts.join(", "));
            if self.color {
                out.push_str(&format!("  {}", parts.dimmed()));
            } else {
                out.push_str(&format!("  {}", parts));
            }
        }
        if let Some(target) = (self.targets)(&trace.header.id) {
            out.push_str(&self.target(&target));
        }
        out.push('\n');

        for line in &trace.lines {
            out.push_str(&pad);
            out.push_str("    ");
            match line {
                TraceLine::CausedBy(caused_by) if self.color => {
                    out.push_str(&caused_by.text.yellow().to_string())
                }
                _ => out.push_str(line.text()),
            }
            if let Some(target) = (self.targets)(&line.line_id()) {
                out.push_str(&self.target(&target));
            }
            out.push('\n');
        }
        out
    }

    pub fn groups(&self, groups: &[TraceGroup<'_>], depth: usize) -> String {
        let mut out = String::new();
        for group in groups {
            match group {
                TraceGroup::Group {
                    label,
                    key,
                    children,
                } => {
                    let title = format!("{}: {} ({})", label, key, group.trace_count());
                    out.push_str(&" ".repeat(depth * 2));
                    if self.color {
                        out.push_str(&title.cyan().bold().to_string());
                    } else {
                        out.push_str(&title);
                    }
                    out.push('\n');
                    out.push_str(&self.groups(children, depth + 1));
                }
                TraceGroup::Trace(trace) => out.push_str(&self.trace(trace, depth * 2)),
            }
        }
        out
    }

    fn target(&self, target: &str) -> String {
        if self.color {
            format!("  -> {}", target.green())
        } else {
            format!("  -> {}", target)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LineView<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TraceView<'a> {
    pub exception: &'a str,
    pub message: Option<&'a str>,
    pub channel: &'a str,
    pub time: DateTime<Utc>,
    pub metadata: &'a BTreeMap<String, String>,
    pub lines: Vec<LineView<'a>>,
}

impl<'a> TraceView<'a> {
    pub fn new(trace: &'a TraceEvent, targets: TargetLookup<'_>) -> Self {
        Self {
            exception: &trace.header.qualified_name,
            message: trace.header.message.as_deref(),
            channel: trace.channel.as_str(),
            time: trace.timestamp,
            metadata: trace.metadata(),
            lines: trace
                .navigables()
                .map(|line| LineView {
                    text: line.text(),
                    target: targets(&line.line_id()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum NodeView<'a> {
    Group {
        label: &'static str,
        key: &'a str,
        count: usize,
        children: Vec<NodeView<'a>>,
    },
    Trace(TraceView<'a>),
}

impl<'a> NodeView<'a> {
    pub fn from_groups(groups: &'a [TraceGroup<'a>], targets: TargetLookup<'_>) -> Vec<Self> {
        groups
            .iter()
            .map(|group| match group {
                TraceGroup::Group {
                    label,
                    key,
                    children,
                } => NodeView::Group {
                    label: *label,
                    key: key.as_str(),
                    count: group.trace_count(),
                    children: Self::from_groups(children, targets),
                },
                TraceGroup::Trace(trace) => NodeView::Trace(TraceView::new(trace, targets)),
            })
            .collect()
    }
}
