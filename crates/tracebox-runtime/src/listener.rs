use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracebox_types::{ChannelTag, RawEvent};

use crate::process::{ListenerId, ProcessHandle, ProcessKey, ProcessOutputListener};
use crate::replay::{ReplayChannel, ReplaySubscription};

type TerminateHook = Box<dyn FnOnce(ProcessKey, ListenerId) + Send>;

/// Turns host callbacks for one process into a replayable `RawEvent` stream.
pub struct ProcessListener {
    id: ListenerId,
    key: ProcessKey,
    display_name: String,
    handle: Arc<dyn ProcessHandle>,
    events: ReplayChannel<RawEvent>,
    token: CancellationToken,
    terminated: AtomicBool,
    on_terminate: Mutex<Option<TerminateHook>>,
}

impl ProcessListener {
    /// Register a new listener with the host handle.
    ///
    /// The stream starts with `ProcessStart`. `token` should be a child of the
    /// caller's token; it is cancelled when this listener terminates.
    pub fn attach(
        handle: Arc<dyn ProcessHandle>,
        replay: usize,
        token: CancellationToken,
        on_terminate: impl FnOnce(ProcessKey, ListenerId) + Send + 'static,
    ) -> Arc<Self> {
        let listener = Arc::new(Self {
            id: ListenerId::next(),
            key: handle.key(),
            display_name: handle.display_name(),
            handle: Arc::clone(&handle),
            events: ReplayChannel::new(replay),
            token,
            terminated: AtomicBool::new(false),
            on_terminate: Mutex::new(Some(Box::new(on_terminate))),
        });
        listener.events.publish(RawEvent::ProcessStart);

        handle.add_listener(listener.id, Arc::clone(&listener) as Arc<dyn ProcessOutputListener>);
        tracing::info!(process = %listener.display_name, key = %listener.key, "Listener attached");

        // The process may have ended before registration took effect.
        if handle.is_terminated() {
            listener.terminate();
        }
        listener
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn key(&self) -> ProcessKey {
        self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> ReplaySubscription<RawEvent> {
        self.events.subscribe()
    }

    /// End the stream because the process is gone.
    pub fn terminate(&self) {
        self.shut_down("process terminated");
    }

    /// End the stream because the watcher is stopping. The process keeps running.
    pub fn detach(&self) {
        self.shut_down("watcher stopped");
    }

    fn shut_down(&self, reason: &'static str) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handle.remove_listener(self.id);
        self.events.publish(RawEvent::ProcessEnd);
        self.events.close();
        self.token.cancel();
        tracing::info!(process = %self.display_name, key = %self.key, reason, "Listener detached");

        let hook = self.on_terminate.lock().take();
        if let Some(hook) = hook {
            hook(self.key, self.id);
        }
    }
}

impl ProcessOutputListener for ProcessListener {
    fn on_text(&self, text: &str, channel: &ChannelTag) {
        if self.is_terminated() {
            return;
        }
        let content = trim_one_separator(text);
        tracing::trace!(process = %self.display_name, channel = %channel, len = content.len(), "output");
        self.events.publish(RawEvent::text(content, channel.clone()));
    }

    fn on_terminated(&self) {
        self.terminate();
    }
}

/// Drop one leading and one trailing line separator, if present.
fn trim_one_separator(text: &str) -> &str {
    let text = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text);
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}
