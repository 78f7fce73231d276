//! Seams to the process host: whatever runs processes and reports their output.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracebox_types::ChannelTag;

/// Host-assigned identity of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessKey(pub u64);

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one registered output listener, used to deregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Enumerates processes currently known to the host.
pub trait ProcessSource: Send + Sync {
    fn running_processes(&self) -> Vec<Arc<dyn ProcessHandle>>;
}

/// One process as seen by the host.
///
/// Hosts call every registered listener for each chunk of output, and call
/// `on_terminated` once the process is gone. A listener added after the
/// process has ended may never be called; callers check `is_terminated`.
/// Listeners may call `remove_listener` from inside a callback, so hosts must
/// not hold their listener lock while dispatching.
pub trait ProcessHandle: Send + Sync {
    fn key(&self) -> ProcessKey;

    fn display_name(&self) -> String;

    fn is_terminated(&self) -> bool;

    fn add_listener(&self, id: ListenerId, listener: Arc<dyn ProcessOutputListener>);

    fn remove_listener(&self, id: ListenerId);
}

/// Receiver of host output callbacks.
pub trait ProcessOutputListener: Send + Sync {
    fn on_text(&self, text: &str, channel: &ChannelTag);

    fn on_terminated(&self);
}
