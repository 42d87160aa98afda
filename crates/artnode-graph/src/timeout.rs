//! Deadline enforcement for blocking collaborator calls.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Why a deadline-bound call produced no value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum Abandoned {
    #[error("did not finish in time")]
    TimedOut,
    #[error("panicked")]
    Panicked,
}

/// Run `op` on a helper thread and wait at most `timeout` for its result.
///
/// On timeout the helper thread is detached and its late result is
/// discarded. A panic in `op` drops the sender before anything is sent,
/// which is reported as [`Abandoned::Panicked`].
pub(crate) fn run_with_timeout<T, F>(timeout: Duration, op: F) -> Result<T, Abandoned>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::spawn(move || {
        let _ = tx.send(op());
    });
    rx.recv_timeout(timeout).map_err(|e| match e {
        RecvTimeoutError::Timeout => Abandoned::TimedOut,
        RecvTimeoutError::Disconnected => Abandoned::Panicked,
    })
}
