/*!
 * Cooperative cancellation for long-running sync work
 *
 * A `CancelToken` is threaded from the orchestrator down through the
 * scanner, walker, worker pool, and retry waits. Cancellation is a typed
 * error, never a panic.
 */

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Clonable cancellation handle
///
/// All clones observe the same flag. `sleep` is the cancellable wait used
/// by the retry policy: it returns early, and returns `false`, when the
/// token is cancelled mid-wait.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel, waking any thread parked in `sleep`
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock().unwrap();
        *cancelled = true;
        self.state.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock().unwrap()
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns `true` when the full duration elapsed, `false` when the wait
    /// was interrupted by `cancel`.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut cancelled = self.state.cancelled.lock().unwrap();
        let deadline = std::time::Instant::now() + duration;

        while !*cancelled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, timeout) = self
                .state
                .condvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap();
            cancelled = guard;
            if timeout.timed_out() {
                return !*cancelled;
            }
        }
        false
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let token = CancelToken::new();
        let waker = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.cancel();
        });

        let start = Instant::now();
        let completed = token.sleep(Duration::from_secs(10));
        handle.join().unwrap();

        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn sleep_on_cancelled_token_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!token.sleep(Duration::from_secs(10)));
    }
}
