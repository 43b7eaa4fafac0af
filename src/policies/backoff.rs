//! # Delay before forking a replacement worker.
//!
//! The delay for restart `n` (0-based) is `first × factor^n`, capped at `max`, then
//! jittered. The base depends only on `n`, so jitter never compounds across restarts.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(200),
//!     max: Duration::from_secs(5),
//!     factor: 3.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(200));
//! assert_eq!(backoff.next(2), Duration::from_millis(1800));
//! assert_eq!(backoff.next(5), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Growth of restart delays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplier per restart; `1.0` keeps the delay constant.
    pub factor: f64,
    /// Randomization applied after capping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `max = 30s`, `factor = 2.0`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay of `delay` before every restart.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay before restart number `attempt` (0-based).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_grows_geometrically_until_cap() {
        let p = policy(100, 1_000, 2.0);
        let delays: Vec<u64> = (0..6).map(|n| p.next(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn test_constant_never_changes() {
        let p = BackoffPolicy::constant(Duration::from_millis(50));
        for n in [0, 1, 10, 1_000] {
            assert_eq!(p.next(n), Duration::from_millis(50));
        }
    }

    #[test]
    fn test_first_above_max_is_capped() {
        assert_eq!(policy(10_000, 5_000, 1.0).next(0), Duration::from_millis(5_000));
    }

    #[test]
    fn test_overflow_is_capped() {
        assert_eq!(policy(100, 10_000, 2.0).next(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_jitter_stays_below_base() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..policy(100, 30_000, 2.0)
        };
        for n in 0..10 {
            let base = Duration::from_millis(100 * 2u64.pow(n));
            assert!(p.next(n) <= base);
        }
    }
}
