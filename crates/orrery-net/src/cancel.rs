//! Shared cancellation token for tearing down blocking I/O.
//!
//! Every link and listener holds a clone of a [`CancelToken`]. The token
//! starts armed and can be stopped exactly once; once stopped it stays
//! stopped, and every blocking operation that observes it fails with
//! [`LinkError::Cancelled`](crate::LinkError::Cancelled) within one poll
//! tick. The token is the only piece of state shared across threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-shot stop signal shared by any number of links and listeners.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    stopped: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new token in the armed state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop every holder of this token. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the token has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_armed() {
        assert!(!CancelToken::new().is_stopped());
    }

    #[test]
    fn test_stop_is_observed_by_all_clones() {
        let token = CancelToken::new();
        let held = token.clone();
        let also_held = held.clone();

        token.stop();
        assert!(token.is_stopped());
        assert!(held.is_stopped());
        assert!(also_held.is_stopped());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let token = CancelToken::new();
        token.stop();
        token.stop();
        assert!(token.is_stopped());
    }

    #[test]
    fn test_clones_made_after_stop_see_stopped() {
        let token = CancelToken::new();
        token.stop();
        assert!(token.clone().is_stopped());
    }
}
