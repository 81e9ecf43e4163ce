//! In-process sliding-window lockout per identifier (phone number).
//!
//! This is the cheap fast-path gate that runs before any database work on a
//! login attempt. The durable audit trail lives in the login_attempts table
//! and is written regardless of lock state. The counter is per-instance: a
//! horizontally scaled deployment needs an implementation of
//! `AttemptCounter` backed by a shared counting cache for the lockout to
//! hold cluster-wide. Only the fast-path gate depends on this state, never
//! the audit guarantee.
use crate::config::RateLimitSettings;
use crate::error::{AuthError, Result};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Fast-path gate over failed attempts per identifier
pub trait AttemptCounter: Send + Sync {
    /// Ok while the identifier is open; `AccountLocked` with a retry-after
    /// hint while locked.
    fn check(&self, identifier: &str) -> Result<()>;

    /// Count one failure, opening a window on the first
    fn record_failure(&self, identifier: &str);

    /// Clear the counter after a successful attempt
    fn clear(&self, identifier: &str);

    /// Evict windows that have fully elapsed, to bound memory
    fn cleanup(&self);
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    failures: u32,
}

pub struct InProcessAttemptCounter {
    windows: DashMap<String, Window>,
    max_attempts: u32,
    window: Duration,
}

impl InProcessAttemptCounter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            windows: DashMap::new(),
            max_attempts: settings.max_attempts,
            window: Duration::from_secs(settings.window_secs),
        }
    }

    fn is_stale(&self, window: &Window) -> bool {
        window.started.elapsed() >= self.window
    }
}

impl AttemptCounter for InProcessAttemptCounter {
    fn check(&self, identifier: &str) -> Result<()> {
        let Some(window) = self.windows.get(identifier) else {
            return Ok(());
        };

        if self.is_stale(&window) || window.failures < self.max_attempts {
            return Ok(());
        }

        let retry_after = self.window.saturating_sub(window.started.elapsed());
        Err(AuthError::AccountLocked {
            retry_after_secs: retry_after.as_secs().max(1),
        })
    }

    fn record_failure(&self, identifier: &str) {
        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert(Window {
                started: Instant::now(),
                failures: 0,
            });

        if self.is_stale(&entry) {
            // Previous window fully elapsed, start over
            entry.started = Instant::now();
            entry.failures = 1;
        } else {
            entry.failures += 1;
        }
    }

    fn clear(&self, identifier: &str) {
        self.windows.remove(identifier);
    }

    fn cleanup(&self) {
        self.windows.retain(|_, window| !self.is_stale(window));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(max_attempts: u32, window_secs: u64) -> InProcessAttemptCounter {
        InProcessAttemptCounter::new(&RateLimitSettings {
            max_attempts,
            window_secs,
        })
    }

    fn counter_with_window_ms(max_attempts: u32, window: Duration) -> InProcessAttemptCounter {
        InProcessAttemptCounter {
            windows: DashMap::new(),
            max_attempts,
            window,
        }
    }

    #[test]
    fn open_until_max_failures() {
        let counter = counter(5, 900);

        for _ in 0..4 {
            counter.record_failure("+15550001");
            assert!(counter.check("+15550001").is_ok());
        }

        counter.record_failure("+15550001");
        assert!(matches!(
            counter.check("+15550001"),
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[test]
    fn lockout_carries_retry_after() {
        let counter = counter(1, 900);
        counter.record_failure("+15550002");

        match counter.check("+15550002") {
            Err(AuthError::AccountLocked { retry_after_secs }) => {
                assert!(retry_after_secs >= 1);
                assert!(retry_after_secs <= 900);
            }
            other => panic!("expected AccountLocked, got {:?}", other.err()),
        }
    }

    #[test]
    fn identifiers_are_independent() {
        let counter = counter(1, 900);
        counter.record_failure("+15550003");

        assert!(counter.check("+15550003").is_err());
        assert!(counter.check("+15550004").is_ok());
    }

    #[test]
    fn success_clears_the_window() {
        let counter = counter(1, 900);
        counter.record_failure("+15550005");
        assert!(counter.check("+15550005").is_err());

        counter.clear("+15550005");
        assert!(counter.check("+15550005").is_ok());
    }

    #[test]
    fn reopens_after_window_elapses() {
        let counter = counter_with_window_ms(1, Duration::from_millis(50));
        counter.record_failure("+15550006");
        assert!(counter.check("+15550006").is_err());

        std::thread::sleep(Duration::from_millis(80));
        assert!(counter.check("+15550006").is_ok());
    }

    #[test]
    fn failure_after_elapsed_window_starts_fresh() {
        let counter = counter_with_window_ms(2, Duration::from_millis(50));
        counter.record_failure("+15550007");
        counter.record_failure("+15550007");
        assert!(counter.check("+15550007").is_err());

        std::thread::sleep(Duration::from_millis(80));
        counter.record_failure("+15550007");
        // One failure in the fresh window, still open
        assert!(counter.check("+15550007").is_ok());
    }

    #[test]
    fn cleanup_evicts_elapsed_windows() {
        let counter = counter_with_window_ms(5, Duration::from_millis(30));
        counter.record_failure("+15550008");
        assert_eq!(counter.windows.len(), 1);

        std::thread::sleep(Duration::from_millis(60));
        counter.cleanup();
        assert_eq!(counter.windows.len(), 0);
    }
}
