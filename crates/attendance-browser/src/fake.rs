//! Scripted in-memory portal.
//!
//! [`FakePortal`] models just enough of the portal for the monitor: a login
//! form shown while logged out, an attendance control that can be toggled,
//! and a session that can be expired from outside. Every session launched by
//! [`FakeLauncher`] shares the same portal state so tests can inspect it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;
use crate::session::{BrowserLauncher, BrowserSession, ElementHandle, Locator};

const LOGIN_CAPTIONS: [&str; 3] = ["Кіру", "Войти", "Login"];
const ATTENDANCE_CAPTION: &str = "Отметиться";

/// Observable state of the fake portal.
#[derive(Debug, Default, Clone)]
pub struct PortalState {
    pub logged_in: bool,
    /// Whether the login button actually logs in.
    pub login_works: bool,
    pub attendance_visible: bool,
    /// Hide the attendance control once it is clicked.
    pub hide_on_click: bool,
    /// Make every attendance click fail.
    pub fail_clicks: bool,
    /// Make every launch fail.
    pub fail_launch: bool,
    /// Make the next `open` return an error.
    pub fail_next_open: bool,
    /// Drop the login on every page load.
    pub expire_on_open: bool,
    /// Make every `open` wait forever, like a navigation the browser never
    /// finishes.
    pub hang_open: bool,
    /// Delay before an attendance click takes effect.
    pub click_delay: Option<Duration>,
    pub launches: usize,
    pub opens: usize,
    pub login_clicks: usize,
    pub attendance_clicks: usize,
    pub attendance_checks: usize,
    /// Attendance lookups made while the portal showed the login form.
    pub checks_while_logged_out: usize,
    pub closed_sessions: usize,
    pub typed: Vec<String>,
}

/// Shared handle on the fake portal.
#[derive(Debug, Clone)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl Default for FakePortal {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePortal {
    /// Logged out, login works, no attendance control.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PortalState {
                login_works: true,
                ..PortalState::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> PortalState {
        self.state().clone()
    }

    /// Drop the authenticated session, as the portal does silently.
    pub fn expire_session(&self) {
        self.state().logged_in = false;
    }

    pub fn show_attendance(&self, visible: bool) {
        self.state().attendance_visible = visible;
    }

    pub fn launcher(&self) -> FakeLauncher {
        FakeLauncher {
            portal: self.clone(),
        }
    }
}

/// [`BrowserLauncher`] producing [`FakeSession`]s on one [`FakePortal`].
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    portal: FakePortal,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let mut state = self.portal.state();
        if state.fail_launch {
            return Err(BrowserError::LaunchFailed {
                endpoint: "fake://portal".to_string(),
                reason: "launch disabled".to_string(),
            });
        }
        state.launches += 1;
        Ok(Box::new(FakeSession {
            portal: self.portal.clone(),
            location: String::new(),
            closed: false,
        }))
    }
}

/// One session on the fake portal.
#[derive(Debug)]
pub struct FakeSession {
    portal: FakePortal,
    location: String,
    closed: bool,
}

impl FakeSession {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed {
            Err(BrowserError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn open(&mut self, url: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        let hang = self.portal.state().hang_open;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.portal.state();
        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(BrowserError::Protocol {
                detail: "navigation failed".to_string(),
            });
        }
        state.opens += 1;
        if state.expire_on_open {
            state.logged_in = false;
        }
        self.location = url.to_string();
        Ok(())
    }

    async fn find(
        &mut self,
        locator: &Locator,
        _wait: Duration,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        self.ensure_open()?;
        let mut state = self.portal.state();
        let logged_out = !state.logged_in;
        let found = match locator {
            Locator::Caption(text) if text == ATTENDANCE_CAPTION => {
                state.attendance_checks += 1;
                if logged_out {
                    state.checks_while_logged_out += 1;
                }
                (!logged_out && state.attendance_visible).then_some("attendance")
            }
            Locator::Caption(text) if LOGIN_CAPTIONS.contains(&text.as_str()) => {
                logged_out.then_some("login-caption")
            }
            Locator::InputClass(_) => logged_out.then_some("username"),
            Locator::InputType(ty) if ty == "password" => logged_out.then_some("password"),
            Locator::ControlClass(_) => logged_out.then_some("login"),
            _ => None,
        };
        Ok(found.map(|id| ElementHandle(id.to_string())))
    }

    async fn type_text(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.portal
            .state()
            .typed
            .push(format!("{}={}", element.id(), text));
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.ensure_open()?;
        let delay = self.portal.state().click_delay;
        if let (Some(delay), "attendance") = (delay, element.id()) {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.portal.state();
        match element.id() {
            "attendance" => {
                if state.fail_clicks {
                    return Err(BrowserError::ElementNotInteractable {
                        reason: "stale attendance control".to_string(),
                    });
                }
                state.attendance_clicks += 1;
                if state.hide_on_click {
                    state.attendance_visible = false;
                }
            }
            "login" | "login-caption" => {
                state.login_clicks += 1;
                state.logged_in = state.login_works;
            }
            _ => {}
        }
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        Ok(self.location.clone())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.closed {
            self.closed = true;
            self.portal.state().closed_sessions += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_login_form_only_while_logged_out() {
        let portal = FakePortal::new();
        let mut session = portal.launcher().launch().await.unwrap();

        let pw = session.find(&Locator::input_type("password"), WAIT).await.unwrap();
        assert!(pw.is_some());

        let login = session
            .find(&Locator::control_class("primary"), WAIT)
            .await
            .unwrap()
            .unwrap();
        session.click(&login).await.unwrap();
        assert!(portal.snapshot().logged_in);

        let pw = session.find(&Locator::input_type("password"), WAIT).await.unwrap();
        assert!(pw.is_none());
    }

    #[tokio::test]
    async fn test_attendance_hidden_after_click() {
        let portal = FakePortal::new();
        {
            let mut s = portal.state();
            s.logged_in = true;
            s.attendance_visible = true;
            s.hide_on_click = true;
        }
        let mut session = portal.launcher().launch().await.unwrap();
        let btn = session
            .find(&Locator::caption(ATTENDANCE_CAPTION), WAIT)
            .await
            .unwrap()
            .unwrap();
        session.click(&btn).await.unwrap();

        let state = portal.snapshot();
        assert_eq!(state.attendance_clicks, 1);
        assert!(!state.attendance_visible);
    }

    #[tokio::test]
    async fn test_closed_session_errors() {
        let portal = FakePortal::new();
        let mut session = portal.launcher().launch().await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(portal.snapshot().closed_sessions, 1);
        assert!(matches!(
            session.open("x").await.unwrap_err(),
            BrowserError::SessionClosed
        ));
    }

    #[tokio::test]
    async fn test_launch_can_fail() {
        let portal = FakePortal::new();
        portal.state().fail_launch = true;
        assert!(portal.launcher().launch().await.is_err());
    }
}
