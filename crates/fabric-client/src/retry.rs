//! Retry budget for controller calls.

use std::time::Duration;

use reqwest::Method;

/// Fixed-interval retry on transport failures.
///
/// Only idempotent verbs are retried; a POST that may have reached the
/// controller is never sent twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            interval: Duration::ZERO,
        }
    }

    /// Total attempts allowed for `method`.
    pub fn attempts_for(&self, method: &Method) -> u32 {
        if is_idempotent(method) {
            self.retries.saturating_add(1)
        } else {
            1
        }
    }
}

/// GET, PUT and DELETE may be repeated safely.
pub fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET || *method == Method::PUT || *method == Method::DELETE
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_idempotent_verbs() {
        assert!(is_idempotent(&Method::GET));
        assert!(is_idempotent(&Method::PUT));
        assert!(is_idempotent(&Method::DELETE));
        assert!(!is_idempotent(&Method::POST));
        assert!(!is_idempotent(&Method::PATCH));
    }

    #[test]
    fn test_attempts() {
        let policy = RetryPolicy {
            retries: 2,
            interval: Duration::from_millis(10),
        };
        assert_eq!(policy.attempts_for(&Method::PUT), 3);
        assert_eq!(policy.attempts_for(&Method::POST), 1);
        assert_eq!(RetryPolicy::none().attempts_for(&Method::GET), 1);
    }

    #[test]
    fn test_attempts_saturate() {
        let policy = RetryPolicy {
            retries: u32::MAX,
            interval: Duration::ZERO,
        };
        assert_eq!(policy.attempts_for(&Method::GET), u32::MAX);
    }
}
