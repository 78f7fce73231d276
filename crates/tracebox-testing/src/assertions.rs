//! Polling helpers for asynchronous expectations.

use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses. Returns whether it held.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Like [`eventually`], panicking with `what` on timeout.
pub async fn wait_for(what: &str, condition: impl FnMut() -> bool) {
    assert!(
        eventually(Duration::from_secs(5), condition).await,
        "timed out waiting for {what}"
    );
}
