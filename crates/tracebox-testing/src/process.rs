//! In-memory process host.
//!
//! `FakeProcess` stands in for a running program: tests push output chunks
//! and end it explicitly. `FakeProcessSource` lists whichever processes the
//! test has started.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracebox_runtime::{ListenerId, ProcessHandle, ProcessKey, ProcessOutputListener, ProcessSource};
use tracebox_types::ChannelTag;

pub struct FakeProcess {
    key: ProcessKey,
    name: String,
    terminated: AtomicBool,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ProcessOutputListener>)>>,
}

impl FakeProcess {
    pub fn new(key: u64, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key: ProcessKey(key),
            name: name.into(),
            terminated: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Deliver a chunk of output to every registered listener.
    pub fn emit(&self, text: &str, channel: &str) {
        let channel = ChannelTag::new(channel);
        for listener in self.snapshot() {
            listener.on_text(text, &channel);
        }
    }

    pub fn emit_stderr(&self, text: &str) {
        self.emit(text, ChannelTag::STDERR);
    }

    /// Deliver every line of `text` as its own chunk.
    pub fn emit_lines(&self, text: &str, channel: &str) {
        for line in text.split('\n') {
            self.emit(line, channel);
        }
    }

    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        for listener in self.snapshot() {
            listener.on_terminated();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    // Callbacks run without the lock held: listeners deregister from inside them.
    fn snapshot(&self) -> Vec<Arc<dyn ProcessOutputListener>> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl ProcessHandle for FakeProcess {
    fn key(&self) -> ProcessKey {
        self.key
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    fn add_listener(&self, id: ListenerId, listener: Arc<dyn ProcessOutputListener>) {
        self.listeners.lock().push((id, listener));
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }
}

#[derive(Default)]
pub struct FakeProcessSource {
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    next_key: AtomicU64,
}

impl FakeProcessSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new running process with a fresh key.
    pub fn start(&self, name: impl Into<String>) -> Arc<FakeProcess> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed) + 1;
        let process = FakeProcess::new(key, name);
        self.processes.lock().push(Arc::clone(&process));
        process
    }

    /// Register a running process under an explicit key, as a host does when
    /// it reuses the handle of a process that has ended.
    pub fn start_with_key(&self, key: u64, name: impl Into<String>) -> Arc<FakeProcess> {
        let process = FakeProcess::new(key, name);
        self.processes.lock().push(Arc::clone(&process));
        process
    }

    /// Drop terminated processes from the listing.
    pub fn reap(&self) {
        self.processes.lock().retain(|process| !process.is_terminated());
    }
}

impl ProcessSource for FakeProcessSource {
    fn running_processes(&self) -> Vec<Arc<dyn ProcessHandle>> {
        self.processes
            .lock()
            .iter()
            .map(|process| Arc::clone(process) as Arc<dyn ProcessHandle>)
            .collect()
    }
}
