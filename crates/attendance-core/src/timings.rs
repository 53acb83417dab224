//! Delay constants for driving the portal.
//!
//! The portal signals neither "login complete" nor "page rendered", so the
//! monitor waits fixed settle delays after each transition. These are
//! heuristics measured against the live portal, not correctness guarantees.

use std::time::Duration;

/// Default seconds between two polls of the portal.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 20;

/// Default seconds a manual-mode detection waits for confirmation.
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 300;

/// Every delay and wait bound used by a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// After pressing the login button.
    pub login_settle: Duration,
    /// After typing the username, before the password.
    pub username_pause: Duration,
    /// After re-requesting the entry URL.
    pub page_settle: Duration,
    /// Extra wait after a re-login triggered by session expiry.
    pub relogin_settle: Duration,
    /// After clicking the attendance control.
    pub click_settle: Duration,
    /// Bound for locating the attendance control.
    pub element_wait: Duration,
    /// Bound for locating the login form.
    pub login_element_wait: Duration,
    /// Pause between two polls.
    pub refresh_interval: Duration,
    /// Granularity at which the refresh pause checks for cancellation.
    pub refresh_step: Duration,
    /// How long a manual-mode detection waits for `mark_now`.
    pub confirm_timeout: Duration,
    /// Granularity of the confirmation wait.
    pub confirm_step: Duration,
    /// How long `stop` waits for an in-flight browser call before it
    /// aborts the monitor task, and for closing the session.
    pub stop_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            login_settle: Duration::from_secs(5),
            username_pause: Duration::from_millis(500),
            page_settle: Duration::from_secs(3),
            relogin_settle: Duration::from_secs(5),
            click_settle: Duration::from_secs(2),
            element_wait: Duration::from_secs(5),
            login_element_wait: Duration::from_secs(15),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            refresh_step: Duration::from_secs(1),
            confirm_timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECS),
            confirm_step: Duration::from_secs(2),
            stop_grace: Duration::from_secs(10),
        }
    }
}

impl Timings {
    /// Defaults with the operator-tunable intervals overridden.
    pub fn with_intervals(refresh_secs: u64, confirm_timeout_secs: u64) -> Self {
        Self {
            refresh_interval: Duration::from_secs(refresh_secs),
            confirm_timeout: Duration::from_secs(confirm_timeout_secs),
            ..Self::default()
        }
    }

    /// Every delay scaled down to a few milliseconds, for exercising the
    /// monitor loop quickly.
    pub fn instant() -> Self {
        let tick = Duration::from_millis(1);
        Self {
            login_settle: tick,
            username_pause: tick,
            page_settle: tick,
            relogin_settle: tick,
            click_settle: tick,
            element_wait: Duration::from_millis(5),
            login_element_wait: Duration::from_millis(5),
            refresh_interval: Duration::from_millis(10),
            refresh_step: Duration::from_millis(2),
            confirm_timeout: Duration::from_millis(60),
            confirm_step: Duration::from_millis(5),
            stop_grace: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings_match_portal_heuristics() {
        let t = Timings::default();
        assert_eq!(t.login_settle, Duration::from_secs(5));
        assert_eq!(t.page_settle, Duration::from_secs(3));
        assert_eq!(t.element_wait, Duration::from_secs(5));
        assert_eq!(t.login_element_wait, Duration::from_secs(15));
        assert_eq!(t.refresh_interval, Duration::from_secs(20));
        assert_eq!(t.confirm_timeout, Duration::from_secs(300));
        assert_eq!(t.confirm_step, Duration::from_secs(2));
        assert_eq!(t.stop_grace, Duration::from_secs(10));
    }

    #[test]
    fn test_with_intervals_overrides_only_intervals() {
        let t = Timings::with_intervals(35, 120);
        assert_eq!(t.refresh_interval, Duration::from_secs(35));
        assert_eq!(t.confirm_timeout, Duration::from_secs(120));
        assert_eq!(t.page_settle, Timings::default().page_settle);
    }

    #[test]
    fn test_instant_steps_fit_inside_bounds() {
        let t = Timings::instant();
        assert!(t.refresh_step <= t.refresh_interval);
        assert!(t.confirm_step <= t.confirm_timeout);
    }
}
