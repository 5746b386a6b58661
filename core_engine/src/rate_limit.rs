use std::time::{Duration, Instant};

use crate::errors::ErrorInfo;
use crate::language::Language;

pub const DEFAULT_MAX_REQUESTS: u32 = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

/// Fixed-window request counter. Exceeding the window capacity locks all
/// requests out for one full window measured from the violation.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    request_count: u32,
    window_start: Instant,
    lockout_until: Option<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, now: Instant) -> Self {
        Self {
            max_requests,
            window,
            request_count: 0,
            window_start: now,
            lockout_until: None,
        }
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    pub fn lockout_until(&self) -> Option<Instant> {
        self.lockout_until
    }

    /// Counts one request at `now`, or rejects it with the seconds left
    /// until requests are accepted again.
    pub fn check_limit(&mut self, now: Instant) -> Result<(), ErrorInfo> {
        if let Some(until) = self.lockout_until {
            if now < until {
                let remaining = until.duration_since(now);
                return Err(ErrorInfo::rate_limited(
                    ceil_secs(remaining),
                    Language::Other,
                ));
            }
        }

        if now.duration_since(self.window_start) > self.window {
            self.request_count = 0;
            self.window_start = now;
            self.lockout_until = None;
        }

        if self.request_count >= self.max_requests {
            self.lockout_until = Some(now + self.window);
            tracing::debug!(
                requests = self.request_count,
                window_ms = self.window.as_millis() as u64,
                "rate limit exceeded, locking out"
            );
            return Err(ErrorInfo::rate_limited(
                ceil_secs(self.window),
                Language::Other,
            ));
        }

        self.request_count += 1;
        Ok(())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn limiter(now: Instant) -> RateLimiter {
        RateLimiter::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, now)
    }

    #[test]
    fn thirty_pass_then_lockout() {
        let start = Instant::now();
        let mut limiter = limiter(start);
        for step in 0..30 {
            let now = start + Duration::from_millis(step * 10);
            assert!(limiter.check_limit(now).is_ok(), "request {step} rejected");
        }

        let now = start + Duration::from_millis(400);
        let error = limiter.check_limit(now).unwrap_err();
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert_eq!(error.retry_after_secs, Some(60));
        assert_eq!(limiter.lockout_until(), Some(now + DEFAULT_WINDOW));
    }

    #[test]
    fn lockout_reports_remaining_seconds() {
        let start = Instant::now();
        let mut limiter = limiter(start);
        for _ in 0..30 {
            limiter.check_limit(start).unwrap();
        }
        limiter.check_limit(start).unwrap_err();

        let later = start + Duration::from_millis(20_500);
        let error = limiter.check_limit(later).unwrap_err();
        assert_eq!(error.retry_after_secs, Some(40));
        assert_eq!(limiter.request_count(), 30);
    }

    #[test]
    fn request_after_lockout_expiry_resets_counter() {
        let start = Instant::now();
        let mut limiter = limiter(start);
        for _ in 0..30 {
            limiter.check_limit(start).unwrap();
        }
        let violation = start + Duration::from_millis(1_000);
        limiter.check_limit(violation).unwrap_err();

        let after = violation + DEFAULT_WINDOW + Duration::from_millis(1);
        assert!(limiter.check_limit(after).is_ok());
        assert_eq!(limiter.request_count(), 1);
        assert_eq!(limiter.lockout_until(), None);
    }

    #[test]
    fn new_window_resets_without_lockout() {
        let start = Instant::now();
        let mut limiter = limiter(start);
        for _ in 0..10 {
            limiter.check_limit(start).unwrap();
        }
        let next_window = start + DEFAULT_WINDOW + Duration::from_millis(1);
        limiter.check_limit(next_window).unwrap();
        assert_eq!(limiter.request_count(), 1);
    }
}
