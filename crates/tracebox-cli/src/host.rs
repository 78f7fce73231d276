//! Child processes as a process host.
//!
//! Output is only read once the first listener registers, so nothing the
//! program prints before the watcher's first poll is lost; the OS pipe
//! buffers it meanwhile.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tracebox_runtime::{ListenerId, ProcessHandle, ProcessKey, ProcessOutputListener, ProcessSource};
use tracebox_types::ChannelTag;

type Listeners = Mutex<Vec<(ListenerId, Arc<dyn ProcessOutputListener>)>>;

pub struct ChildProcess {
    key: ProcessKey,
    name: String,
    terminated: AtomicBool,
    listeners: Listeners,
    attached: watch::Sender<bool>,
}

impl ChildProcess {
    /// Spawn `program` with piped output. The returned receiver yields the
    /// exit status once the program has ended and its output is drained.
    pub fn spawn(program: &str, args: &[String]) -> Result<(Arc<Self>, oneshot::Receiver<ExitStatus>)> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", program))?;

        let stdout = child.stdout.take().context("Child stdout was not captured")?;
        let stderr = child.stderr.take().context("Child stderr was not captured")?;

        let (attached, _) = watch::channel(false);
        let process = Arc::new(Self {
            key: ProcessKey(u64::from(child.id().unwrap_or_default())),
            name: display_name(program),
            terminated: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            attached,
        });

        let stdout_pump = tokio::spawn(pump(Arc::clone(&process), stdout, ChannelTag::stdout()));
        let stderr_pump = tokio::spawn(pump(Arc::clone(&process), stderr, ChannelTag::stderr()));

        let (status_tx, status_rx) = oneshot::channel();
        let reaper = Arc::clone(&process);
        tokio::spawn(async move {
            let _ = stdout_pump.await;
            let _ = stderr_pump.await;
            let status = child.wait().await;
            reaper.finish();
            match status {
                Ok(status) => {
                    tracing::info!(process = %reaper.name, %status, "Child exited");
                    let _ = status_tx.send(status);
                }
                Err(err) => {
                    tracing::error!(process = %reaper.name, error = %err, "Failed to wait for child")
                }
            }
        });

        Ok((process, status_rx))
    }

    fn dispatch(&self, text: &str, channel: &ChannelTag) {
        for listener in self.snapshot() {
            listener.on_text(text, channel);
        }
    }

    fn finish(&self) {
        self.terminated.store(true, Ordering::Release);
        for listener in self.snapshot() {
            listener.on_terminated();
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn ProcessOutputListener>> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl ProcessHandle for ChildProcess {
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
        self.attached.send_replace(true);
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }
}

async fn pump(process: Arc<ChildProcess>, output: impl AsyncRead + Unpin, channel: ChannelTag) {
    let mut attached = process.attached.subscribe();
    if attached.wait_for(|attached| *attached).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(output).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => process.dispatch(&line, &channel),
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(channel = %channel, error = %err, "Failed to read child output");
                break;
            }
        }
    }
}

fn display_name(program: &str) -> String {
    std::path::Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program)
        .to_string()
}

/// Process source over the children this invocation started.
#[derive(Default)]
pub struct ChildProcessSource {
    children: Mutex<Vec<Arc<ChildProcess>>>,
}

impl ChildProcessSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, child: Arc<ChildProcess>) {
        self.children.lock().push(child);
    }
}

impl ProcessSource for ChildProcessSource {
    fn running_processes(&self) -> Vec<Arc<dyn ProcessHandle>> {
        self.children
            .lock()
            .iter()
            .map(|child| Arc::clone(child) as Arc<dyn ProcessHandle>)
            .collect()
    }
}
