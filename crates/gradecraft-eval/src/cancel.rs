//! Out-of-band cancellation for a running interpreter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A one-shot flag shared between the interpreter and whoever enforces its
/// deadline.
///
/// The interpreter polls the flag at every statement and expression; once
/// set it is never cleared, so a cancelled run stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is already tripped.
    pub fn cancelled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn pre_cancelled_token() {
        assert!(CancelToken::cancelled().is_cancelled());
    }
}
