//! Process-wide set of running monitors.
//!
//! At most one live [`Monitor`] exists per account. Start holds the map lock
//! for its whole check-and-insert sequence, so two concurrent starts for the
//! same account launch a single browser. Nothing awaits a monitor while
//! holding the lock: stop, sweep and shutdown take their entries out first
//! and stop them afterwards, so a monitor stuck in a browser call never
//! stalls other accounts.

use std::collections::HashMap;
use std::sync::Arc;

use attendance_browser::BrowserLauncher;
use attendance_core::timings::Timings;
use attendance_core::{Account, AccountId, Mode};
use tokio::sync::Mutex;

use crate::events::EventSender;
use crate::monitor::{Monitor, MonitorConfig};

/// Result of [`MonitorRegistry::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A live monitor already exists for the account; nothing was changed.
    AlreadyActive,
}

pub struct MonitorRegistry {
    monitors: Mutex<HashMap<AccountId, Arc<Monitor>>>,
    launcher: Arc<dyn BrowserLauncher>,
    events: EventSender,
    portal_url: String,
    timings: Timings,
}

impl MonitorRegistry {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        events: EventSender,
        portal_url: impl Into<String>,
        timings: Timings,
    ) -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
            launcher,
            events,
            portal_url: portal_url.into(),
            timings,
        }
    }

    /// Start a monitor for a stored account.
    pub async fn start_account(&self, account: &Account) -> StartOutcome {
        let config = MonitorConfig::for_account(account, &self.portal_url, self.timings);
        self.start(config).await
    }

    /// Create and start a monitor unless a live one exists. A dead entry
    /// left behind by a crashed task is replaced.
    pub async fn start(&self, config: MonitorConfig) -> StartOutcome {
        let account = config.account;
        let mut monitors = self.monitors.lock().await;
        if monitors.get(&account).is_some_and(|m| m.is_running()) {
            tracing::debug!(account, "monitor already active");
            return StartOutcome::AlreadyActive;
        }

        let monitor = Arc::new(Monitor::new(
            config,
            Arc::clone(&self.launcher),
            self.events.clone(),
        ));
        monitor.start();
        monitors.insert(account, monitor);
        tracing::info!(account, "monitor started");
        StartOutcome::Started
    }

    /// Stop and forget the account's monitor. Returns whether one existed.
    pub async fn stop(&self, account: AccountId) -> bool {
        let removed = self.monitors.lock().await.remove(&account);
        match removed {
            Some(monitor) => {
                monitor.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, account: AccountId) -> Option<Arc<Monitor>> {
        self.monitors.lock().await.get(&account).cloned()
    }

    /// Whether the account has a live monitor.
    pub async fn is_active(&self, account: AccountId) -> bool {
        self.monitors
            .lock()
            .await
            .get(&account)
            .is_some_and(|m| m.is_running())
    }

    /// Switch the mode of a running monitor. Returns `false` when there is
    /// none; the caller persists the mode either way.
    pub async fn set_mode(&self, account: AccountId, mode: Mode) -> bool {
        match self.monitors.lock().await.get(&account) {
            Some(monitor) => {
                monitor.set_mode(mode);
                true
            }
            None => false,
        }
    }

    /// Forward a manual confirmation. `None` when the account has no
    /// monitor. The click runs outside the map lock.
    pub async fn mark_now(&self, account: AccountId) -> Option<bool> {
        let monitor = self.get(account).await?;
        Some(monitor.mark_now().await)
    }

    /// Accounts with a live monitor, in ascending order.
    pub async fn active_accounts(&self) -> Vec<AccountId> {
        let monitors = self.monitors.lock().await;
        let mut ids: Vec<AccountId> = monitors
            .iter()
            .filter(|(_, m)| m.is_running())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Remove entries whose task has terminated and return their accounts.
    pub async fn sweep(&self) -> Vec<AccountId> {
        let mut removed: Vec<(AccountId, Arc<Monitor>)> = {
            let mut monitors = self.monitors.lock().await;
            let dead: Vec<AccountId> = monitors
                .iter()
                .filter(|(_, m)| !m.is_running())
                .map(|(id, _)| *id)
                .collect();
            dead.into_iter()
                .filter_map(|id| monitors.remove(&id).map(|m| (id, m)))
                .collect()
        };
        removed.sort_unstable_by_key(|(id, _)| *id);

        for (id, monitor) in &removed {
            // Releases a session a faulted task may still hold.
            monitor.stop().await;
            tracing::warn!(account = *id, "removed dead monitor");
        }
        removed.into_iter().map(|(id, _)| id).collect()
    }

    /// Stop every monitor. Used at shutdown.
    pub async fn stop_all(&self) {
        let drained: Vec<(AccountId, Arc<Monitor>)> =
            self.monitors.lock().await.drain().collect();
        for (account, monitor) in drained {
            tracing::debug!(account, "stopping monitor");
            monitor.stop().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.monitors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.monitors.lock().await.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
