//! Multicast stream with bounded history.
//!
//! Every subscriber first receives the retained backlog (at most `capacity`
//! most recent values), then live values. Backlog snapshot and live
//! registration happen under one lock, so a subscriber never sees a gap or a
//! duplicate at the seam.

use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

struct State<T> {
    history: VecDeque<T>,
    sender: Option<broadcast::Sender<T>>,
}

pub struct ReplayChannel<T> {
    state: Arc<Mutex<State<T>>>,
    capacity: usize,
}

impl<T> Clone for ReplayChannel<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + 'static> ReplayChannel<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            state: Arc::new(Mutex::new(State {
                history: VecDeque::with_capacity(capacity),
                sender: Some(sender),
            })),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish a value. Returns `false` once the channel is closed.
    pub fn publish(&self, value: T) -> bool {
        let mut state = self.state.lock();
        let Some(sender) = state.sender.clone() else {
            return false;
        };
        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(value.clone());
        // No live receivers is fine; the history still holds the value.
        let _ = sender.send(value);
        true
    }

    pub fn subscribe(&self) -> ReplaySubscription<T> {
        let state = self.state.lock();
        ReplaySubscription {
            backlog: state.history.clone(),
            live: state.sender.as_ref().map(broadcast::Sender::subscribe),
        }
    }

    /// Stop accepting values. Subscribers drain what they have, then end.
    pub fn close(&self) {
        self.state.lock().sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sender.is_none()
    }

    /// Number of values currently retained for replay.
    pub fn retained(&self) -> usize {
        self.state.lock().history.len()
    }
}

/// One subscriber's view: backlog first, then live values.
pub struct ReplaySubscription<T> {
    backlog: VecDeque<T>,
    live: Option<broadcast::Receiver<T>>,
}

impl<T: Clone + Send + 'static> ReplaySubscription<T> {
    /// Next value, or `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(value) = self.backlog.pop_front() {
            return Some(value);
        }
        let live = self.live.as_mut()?;
        loop {
            match live.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Replay subscriber lagged; skipping ahead");
                }
                Err(RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|value| (value, subscription))
        })
    }
}
