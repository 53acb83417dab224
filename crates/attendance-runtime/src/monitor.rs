//! Per-account portal monitor.
//!
//! A [`Monitor`] owns one browser session and runs the login → poll → detect
//! → act loop in its own tokio task:
//!
//! ```text
//! Starting → Authenticating → Polling ⇄ ActionPending (manual mode)
//!                                 ↓
//!                        Stopped | Faulted
//! ```
//!
//! The session sits behind an async mutex because [`Monitor::stop`] and
//! [`Monitor::mark_now`] are called from the control path while the loop is
//! running. `stop` takes the session out of the slot before closing it, so
//! a poll step that runs afterwards finds an empty slot and ends the loop
//! instead of touching a closed session.
//!
//! Cancellation is cooperative: every settle delay, the refresh pause and
//! the confirmation wait check the stop signal in small increments.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use attendance_browser::{BrowserError, BrowserLauncher, BrowserSession, Locator};
use attendance_core::timings::Timings;
use attendance_core::{Account, AccountId, Mode};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::events::{EventSender, FoundStatus, MonitorEvent};

// ── Portal constants ──────────────────────────────────────────────────────────

/// Captions of the login button in the portal's three locales.
pub const LOGIN_CAPTIONS: [&str; 3] = ["Кіру", "Войти", "Login"];

/// Caption of the attendance control.
pub const ATTENDANCE_CAPTION: &str = "Отметиться";

/// The username field is a Vaadin filter-select combo box.
const USERNAME_INPUT_CLASS: &str = "v-filterselect-input";

const PASSWORD_INPUT_TYPE: &str = "password";

/// The login button is the form's primary control.
const LOGIN_CONTROL_CLASS: &str = "primary";

// ── Public types ──────────────────────────────────────────────────────────────

/// Where a monitor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Created, never started.
    Idle,
    Starting,
    Authenticating,
    Polling,
    /// Manual mode: the control was found and awaits `mark_now`.
    ActionPending,
    Stopped,
    Faulted,
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorState::Stopped | MonitorState::Faulted)
    }
}

/// Errors that end a monitor loop.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// The login page did not render the expected field.
    #[error("login form has no {0}")]
    LoginFormMissing(&'static str),
}

/// Static configuration of one monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub account: AccountId,
    pub username: String,
    pub password: String,
    pub mode: Mode,
    pub portal_url: String,
    /// Never log in and never check for expiry.
    pub skip_login: bool,
    pub timings: Timings,
}

impl MonitorConfig {
    pub fn for_account(account: &Account, portal_url: &str, timings: Timings) -> Self {
        Self {
            account: account.telegram_id,
            username: account.username.clone(),
            password: account.password.clone(),
            mode: account.mode,
            portal_url: portal_url.to_string(),
            skip_login: false,
            timings,
        }
    }
}

/// Outcome of one step of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Stop was requested or the session is gone.
    Halt,
}

// ── Monitor ───────────────────────────────────────────────────────────────────

/// One account's portal watcher.
pub struct Monitor {
    inner: Arc<Inner>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: MonitorConfig,
    mode: StdMutex<Mode>,
    state: StdMutex<MonitorState>,
    pending: AtomicBool,
    session: Mutex<Option<Box<dyn BrowserSession>>>,
    cancel: watch::Sender<bool>,
    launcher: Arc<dyn BrowserLauncher>,
    events: EventSender,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        launcher: Arc<dyn BrowserLauncher>,
        events: EventSender,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        let inner = Inner {
            mode: StdMutex::new(config.mode),
            state: StdMutex::new(MonitorState::Idle),
            pending: AtomicBool::new(false),
            session: Mutex::new(None),
            cancel,
            launcher,
            events,
            config,
        };
        Self {
            inner: Arc::new(inner),
            task: StdMutex::new(None),
        }
    }

    pub fn account(&self) -> AccountId {
        self.inner.config.account
    }

    pub fn username(&self) -> &str {
        &self.inner.config.username
    }

    /// Spawn the monitor task. Returns `false` (and does nothing) when the
    /// task is already running.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        self.inner.cancel.send_replace(false);
        self.inner.set_state(MonitorState::Starting);
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run().await }));
        true
    }

    /// Signal cancellation and close the session. Safe to call at any time;
    /// once it returns the monitor counts as terminated even if its task is
    /// still unwinding.
    ///
    /// Returns within a few multiples of `stop_grace`: a task stuck in a
    /// browser call is aborted, and a session that cannot be reclaimed or
    /// closed in time is abandoned.
    pub async fn stop(&self) {
        let account = self.account();
        let grace = self.inner.config.timings.stop_grace;
        self.inner.cancel.send_replace(true);
        self.inner.pending.store(false, Ordering::SeqCst);

        let session = match self.take_session(grace).await {
            Some(session) => session,
            None => {
                tracing::warn!(account, "monitor task busy in a browser call; aborting it");
                self.abort_task().await;
                match self.take_session(grace).await {
                    Some(session) => session,
                    None => {
                        tracing::warn!(account, "browser session still locked; abandoning it");
                        None
                    }
                }
            }
        };
        if let Some(mut session) = session {
            match tokio::time::timeout(grace, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(account, error = %e, "closing session on stop failed")
                }
                Err(_) => tracing::warn!(account, "closing session on stop timed out"),
            }
        }
        self.inner.set_state(MonitorState::Stopped);
        tracing::info!(account, "monitor stopped");
    }

    /// Empty the session slot. `None` when the slot stayed locked for
    /// `wait`.
    async fn take_session(&self, wait: Duration) -> Option<Option<Box<dyn BrowserSession>>> {
        let mut slot = tokio::time::timeout(wait, self.inner.session.lock())
            .await
            .ok()?;
        Some(slot.take())
    }

    /// Cancel the task at its current await point and wait until it is gone.
    async fn abort_task(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    /// Whether the monitor task is still alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Takes effect at the next detection; an ongoing confirmation wait is
    /// not cut short.
    pub fn set_mode(&self, mode: Mode) {
        *self.inner.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode()
    }

    pub fn state(&self) -> MonitorState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a manual confirmation is outstanding.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Click the attendance control on the operator's behalf.
    ///
    /// Returns `false` without side effects when there is no session or no
    /// pending confirmation, and `false` with a status event when the click
    /// itself fails (the control may have expired).
    pub async fn mark_now(&self) -> bool {
        let inner = &self.inner;
        let mut guard = inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if !inner.pending.load(Ordering::SeqCst) {
            return false;
        }

        let locator = Locator::caption(ATTENDANCE_CAPTION);
        let clicked = match session.find(&locator, inner.config.timings.element_wait).await {
            Ok(Some(button)) => session.click(&button).await.map(|_| true),
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        drop(guard);

        match clicked {
            Ok(true) => {
                // The confirmation wait may have timed out after the click;
                // whoever clears the flag owns this detection.
                if inner
                    .pending
                    .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    tracing::info!(
                        account = inner.config.account,
                        "clicked after the confirmation wait ended; not reporting"
                    );
                    return false;
                }
                tracing::info!(account = inner.config.account, "attendance marked manually");
                inner.found(FoundStatus::Marked).await;
                true
            }
            Ok(false) => {
                inner.status("Failed to mark: button is no longer available").await;
                false
            }
            Err(e) => {
                tracing::warn!(account = inner.config.account, error = %e, "manual mark failed");
                inner.status(format!("Failed to mark: {e}")).await;
                false
            }
        }
    }
}

// ── Monitor loop ──────────────────────────────────────────────────────────────

impl Inner {
    fn mode(&self) -> Mode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: MonitorState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Task body: drive the loop, then record the terminal state and release
    /// the session whatever happened.
    async fn run(self: Arc<Self>) {
        let account = self.config.account;
        self.status("Starting monitor...").await;

        let result = self.drive().await;
        match result {
            Err(e) if !self.cancelled() => {
                tracing::error!(account, error = %e, "monitor faulted");
                self.status(format!("Monitor error: {e}")).await;
                self.set_state(MonitorState::Faulted);
            }
            _ => self.set_state(MonitorState::Stopped),
        }

        self.pending.store(false, Ordering::SeqCst);
        let session = self.session.lock().await.take();
        if let Some(mut session) = session {
            if let Err(e) = session.close().await {
                tracing::debug!(account, error = %e, "closing session failed");
            }
        }
        self.status("Monitor stopped.").await;
    }

    async fn drive(&self) -> Result<(), MonitorError> {
        let session = self.launcher.launch().await?;
        {
            let mut slot = self.session.lock().await;
            if self.cancelled() {
                drop(slot);
                let mut session = session;
                let _ = session.close().await;
                return Ok(());
            }
            *slot = Some(session);
        }

        if !self.config.skip_login && self.authenticate().await? == Flow::Halt {
            return Ok(());
        }

        let mut refresh: u64 = 0;
        while !self.cancelled() {
            refresh += 1;
            self.set_state(MonitorState::Polling);
            self.status(format!("Refresh #{refresh}")).await;

            if self.poll_once().await? == Flow::Halt {
                break;
            }
            let timings = &self.config.timings;
            if !self
                .sleep_cancellable(timings.refresh_interval, timings.refresh_step)
                .await
            {
                break;
            }
        }
        Ok(())
    }

    /// Fill in the login form and press the login button.
    ///
    /// Success is not verified beyond a warning: if the login silently
    /// failed, the next poll's expiry check sends us back here.
    async fn authenticate(&self) -> Result<Flow, MonitorError> {
        self.set_state(MonitorState::Authenticating);
        self.status("Logging in...").await;
        let timings = &self.config.timings;

        {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(Flow::Halt);
            };
            session.open(&self.config.portal_url).await?;
            let username_field = session
                .find(
                    &Locator::input_class(USERNAME_INPUT_CLASS),
                    timings.login_element_wait,
                )
                .await?
                .ok_or(MonitorError::LoginFormMissing("username field"))?;
            session
                .type_text(&username_field, &self.config.username)
                .await?;
        }

        if !self.pause(timings.username_pause).await {
            return Ok(Flow::Halt);
        }

        {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(Flow::Halt);
            };
            let password_field = session
                .find(&Locator::input_type(PASSWORD_INPUT_TYPE), Duration::ZERO)
                .await?
                .ok_or(MonitorError::LoginFormMissing("password field"))?;
            session
                .type_text(&password_field, &self.config.password)
                .await?;
            let login_button = session
                .find(&Locator::control_class(LOGIN_CONTROL_CLASS), Duration::ZERO)
                .await?
                .ok_or(MonitorError::LoginFormMissing("login button"))?;
            session.click(&login_button).await?;
        }

        if !self.pause(timings.login_settle).await {
            return Ok(Flow::Halt);
        }

        let location = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(Flow::Halt);
            };
            session.current_location().await?
        };
        self.status(format!("Login attempted. URL: {location}")).await;

        if self.session_expired().await == Some(true) {
            tracing::warn!(
                account = self.config.account,
                "login form still visible after login; continuing"
            );
        }
        Ok(Flow::Continue)
    }

    /// One refresh: reload, re-login if the session expired, then look for
    /// the attendance control and act on it.
    async fn poll_once(&self) -> Result<Flow, MonitorError> {
        let timings = &self.config.timings;
        let account = self.config.account;

        {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(Flow::Halt);
            };
            // A full request; an in-place reload drops the portal session.
            session.open(&self.config.portal_url).await?;
        }
        if !self.pause(timings.page_settle).await {
            return Ok(Flow::Halt);
        }

        if !self.config.skip_login {
            match self.session_expired().await {
                None => return Ok(Flow::Halt),
                Some(false) => {}
                Some(true) => {
                    self.status("Session expired, re-logging in...").await;
                    if self.authenticate().await? == Flow::Halt {
                        return Ok(Flow::Halt);
                    }
                    if !self.pause(timings.relogin_settle).await {
                        return Ok(Flow::Halt);
                    }
                    self.set_state(MonitorState::Polling);
                    match self.session_expired().await {
                        None => return Ok(Flow::Halt),
                        Some(true) => {
                            tracing::warn!(account, "still logged out after re-login; skipping action check");
                            return Ok(Flow::Continue);
                        }
                        Some(false) => {}
                    }
                }
            }
        }

        let found = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Ok(Flow::Halt);
            };
            session
                .find(&Locator::caption(ATTENDANCE_CAPTION), timings.element_wait)
                .await
        };
        let button = match found {
            Ok(Some(button)) => button,
            Ok(None) => {
                tracing::debug!(account, "attendance button not available");
                return Ok(Flow::Continue);
            }
            Err(e) => {
                tracing::warn!(account, error = %e, "attendance lookup failed; treating as not available");
                return Ok(Flow::Continue);
            }
        };

        match self.mode() {
            Mode::Automatic => {
                let clicked = {
                    let mut guard = self.session.lock().await;
                    let Some(session) = guard.as_mut() else {
                        return Ok(Flow::Halt);
                    };
                    session.click(&button).await
                };
                match clicked {
                    Ok(()) => {
                        tracing::info!(account, "attendance button clicked");
                        self.status("Attendance button clicked!").await;
                        self.found(FoundStatus::Marked).await;
                        if !self.pause(timings.click_settle).await {
                            return Ok(Flow::Halt);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(account, error = %e, "attendance click failed");
                        self.status(format!("Failed to click attendance button: {e}"))
                            .await;
                    }
                }
            }
            Mode::Manual => self.await_confirmation().await,
        }
        Ok(Flow::Continue)
    }

    /// Manual mode: announce the control and wait for `mark_now` or stop,
    /// for at most the confirmation timeout.
    async fn await_confirmation(&self) {
        let timings = &self.config.timings;
        self.set_state(MonitorState::ActionPending);
        self.pending.store(true, Ordering::SeqCst);
        self.found(FoundStatus::Found).await;
        self.status("Attendance available! Waiting for manual mark...")
            .await;

        let deadline = Instant::now() + timings.confirm_timeout;
        while self.pending.load(Ordering::SeqCst) && !self.cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(timings.confirm_step.min(deadline - now)).await;
        }

        if self.pending.swap(false, Ordering::SeqCst) && !self.cancelled() {
            tracing::info!(account = self.config.account, "manual mark timed out");
            self.status("Manual mark timed out.").await;
        }
        if !self.cancelled() {
            self.set_state(MonitorState::Polling);
        }
    }

    /// Probe the page for login affordances. `None` when the session is gone.
    ///
    /// Lookup errors count as "not expired": the probe is a heuristic and
    /// must not fault the monitor.
    async fn session_expired(&self) -> Option<bool> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut()?;

        for caption in LOGIN_CAPTIONS {
            match session.find(&Locator::caption(caption), Duration::ZERO).await {
                Ok(Some(_)) => return Some(true),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(account = self.config.account, error = %e, "expiry probe failed");
                    return Some(false);
                }
            }
        }
        let password = session
            .find(&Locator::input_type(PASSWORD_INPUT_TYPE), Duration::ZERO)
            .await;
        Some(matches!(password, Ok(Some(_))))
    }

    /// Settle delay that honours cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        self.sleep_cancellable(duration, self.config.timings.refresh_step)
            .await
    }

    /// Sleep `total` in `step` increments. Returns `false` as soon as stop is
    /// requested.
    async fn sleep_cancellable(&self, total: Duration, step: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep(step.min(deadline - now)).await;
        }
    }

    // ── Event emission ────────────────────────────────────────────────────

    async fn found(&self, status: FoundStatus) {
        self.emit(MonitorEvent::AttendanceFound {
            account: self.config.account,
            username: self.config.username.clone(),
            status,
        })
        .await;
    }

    async fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(account = self.config.account, %message, "monitor status");
        self.emit(MonitorEvent::Status {
            account: self.config.account,
            username: self.config.username.clone(),
            message,
        })
        .await;
    }

    /// A closed receiver is not the monitor's problem: log and carry on. A
    /// full channel blocks the loop until the consumer catches up or stop is
    /// requested.
    async fn emit(&self, event: MonitorEvent) {
        let mut cancel = self.cancel.subscribe();
        tokio::select! {
            biased;
            sent = self.events.send(event) => {
                if let Err(e) = sent {
                    tracing::debug!(account = self.config.account, error = %e, "event receiver dropped");
                }
            }
            _ = async { let _ = cancel.wait_for(|stop| *stop).await; } => {
                tracing::debug!(account = self.config.account, "event dropped on stop");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
