//! Out-of-band deadline enforcement.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gradecraft_eval::CancelToken;
use tracing::warn;

/// Trips a [`CancelToken`] once a deadline passes, unless dropped first.
///
/// Dropping the guard disarms and joins the watchdog thread, so every exit
/// path of the guarded run leaves no timer behind.
pub(crate) struct Watchdog {
    disarm: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start watching. A zero deadline cancels the token immediately.
    pub(crate) fn arm(token: CancelToken, deadline: Duration) -> Self {
        if deadline.is_zero() {
            token.cancel();
            return Self::idle();
        }
        let (disarm, disarmed) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("gradecraft-watchdog".into())
            .spawn({
                let token = token.clone();
                move || {
                    if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(deadline) {
                        token.cancel();
                    }
                }
            });
        match spawned {
            Ok(thread) => Self {
                disarm: Some(disarm),
                thread: Some(thread),
            },
            Err(err) => {
                // Fail closed.
                warn!(error = %err, "could not start the watchdog thread");
                token.cancel();
                Self::idle()
            }
        }
    }

    fn idle() -> Self {
        Self {
            disarm: None,
            thread: None,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(disarm) = self.disarm.take() {
            let _ = disarm.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
