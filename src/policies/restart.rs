//! # Restart policy for worker slots.
//!
//! [`RestartPolicy`] decides whether an exited worker is replaced and how long to wait
//! first. Replacement happens on **every** exit (clean or not) until the manager stops.
//!
//! ```text
//! RestartPolicy::unlimited()   → replace forever, immediately (default)
//! RestartPolicy::never()       → run once; the slot stays empty after exit
//! RestartPolicy::limited(3)    → at most 3 replacements
//!     .with_backoff(b)         → wait b.next(n) before replacement n
//! ```

use std::time::Duration;

use crate::policies::backoff::BackoffPolicy;

/// Whether and when a slot's worker is replaced after it exits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestartPolicy {
    /// Maximum number of replacements; `None` is unlimited.
    pub max_restarts: Option<u32>,
    /// Delay schedule between exit and replacement; `None` restarts immediately.
    pub backoff: Option<BackoffPolicy>,
}

impl Default for RestartPolicy {
    /// Returns [`RestartPolicy::unlimited`].
    fn default() -> Self {
        Self::unlimited()
    }
}

impl RestartPolicy {
    /// Replace every exited worker, immediately, forever.
    pub const fn unlimited() -> Self {
        Self {
            max_restarts: None,
            backoff: None,
        }
    }

    /// Never replace.
    pub const fn never() -> Self {
        Self {
            max_restarts: Some(0),
            backoff: None,
        }
    }

    /// Replace at most `n` times.
    pub const fn limited(n: u32) -> Self {
        Self {
            max_restarts: Some(n),
            backoff: None,
        }
    }

    /// Waits according to `backoff` before each replacement.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// `true` if another replacement is permitted after `restarts` replacements.
    pub fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.is_none_or(|max| restarts < max)
    }

    /// Delay before replacement number `restarts` (0-based).
    pub fn delay(&self, restarts: u32) -> Duration {
        self.backoff
            .map(|b| b.next(restarts))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited_and_immediate() {
        let p = RestartPolicy::default();
        assert!(p.allows(u32::MAX - 1));
        assert_eq!(p.delay(42), Duration::ZERO);
    }

    #[test]
    fn test_limited_counts_replacements() {
        let p = RestartPolicy::limited(2);
        assert!(p.allows(0));
        assert!(p.allows(1));
        assert!(!p.allows(2));
        assert!(!RestartPolicy::never().allows(0));
    }

    #[test]
    fn test_backoff_drives_delay() {
        let p = RestartPolicy::unlimited().with_backoff(BackoffPolicy::constant(Duration::from_millis(30)));
        assert_eq!(p.delay(0), Duration::from_millis(30));
        assert_eq!(p.delay(9), Duration::from_millis(30));
    }
}
