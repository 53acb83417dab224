//! W3C WebDriver client implementing [`BrowserSession`].
//!
//! Talks JSON over HTTP to a running chromedriver (`chromedriver --port=9515`).
//! Each [`WebDriverSession`] owns one remote browser session; lookups compile
//! a [`Locator`] to the XPath shapes the portal renders (Vaadin widgets).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::BrowserError;
use crate::session::{BrowserLauncher, BrowserSession, ElementHandle, Locator};

/// Key under which W3C servers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Pause between two lookup attempts while waiting for an element.
const FIND_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound for one WebDriver command, page loads included.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

// ── Wire client ───────────────────────────────────────────────────────────────

/// Thin JSON-over-HTTP wrapper shared by the launcher and sessions.
#[derive(Clone)]
struct WireClient {
    http: Client,
    endpoint: String,
    limit: Duration,
}

impl WireClient {
    fn new(endpoint: &str, limit: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(limit)
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            limit,
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(%method, path, "WebDriver command");
        let exchange = async {
            let response = request.send().await?;
            let ok = response.status().is_success();
            let payload: Value = response.json().await?;
            parse_response(ok, payload)
        };
        tokio::time::timeout(self.limit, exchange)
            .await
            .map_err(|_| BrowserError::Timeout {
                command: format!("{method} {path}"),
                limit: self.limit,
            })?
    }
}

/// Unwrap the `value` member of a WebDriver response, turning error objects
/// into [`BrowserError::WebDriver`].
fn parse_response(ok: bool, payload: Value) -> Result<Value, BrowserError> {
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(BrowserError::WebDriver {
            error: error.to_string(),
            message,
        });
    }
    if !ok {
        return Err(BrowserError::Protocol {
            detail: format!("error status without error object: {value}"),
        });
    }
    Ok(value)
}

// ── WebDriverLauncher ─────────────────────────────────────────────────────────

/// Creates Chrome sessions on a WebDriver endpoint.
pub struct WebDriverLauncher {
    wire: WireClient,
    headless: bool,
}

impl WebDriverLauncher {
    /// `endpoint` is the chromedriver base URL, e.g. `http://localhost:9515`.
    pub fn new(endpoint: &str, headless: bool) -> Self {
        Self::with_command_timeout(endpoint, headless, COMMAND_TIMEOUT)
    }

    /// Like [`WebDriverLauncher::new`] with a custom per-command bound.
    pub fn with_command_timeout(endpoint: &str, headless: bool, limit: Duration) -> Self {
        Self {
            wire: WireClient::new(endpoint, limit),
            headless,
        }
    }

    /// Chrome command-line switches for a server environment.
    pub fn chrome_args(&self) -> Vec<&'static str> {
        let mut args = vec![
            "--ignore-certificate-errors",
            "--no-sandbox",
            "--disable-dev-shm-usage",
        ];
        if self.headless {
            args.insert(0, "--headless");
        }
        args
    }

    /// `POST /session` body.
    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": { "args": self.chrome_args() },
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let launch_failed = |reason: String| BrowserError::LaunchFailed {
            endpoint: self.wire.endpoint.clone(),
            reason,
        };

        let value = self
            .wire
            .call(Method::POST, "/session", Some(self.capabilities()))
            .await
            .map_err(|e| launch_failed(e.to_string()))?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| launch_failed("response carried no sessionId".to_string()))?
            .to_string();

        info!(session_id = %session_id, "browser session created");
        Ok(Box::new(WebDriverSession {
            wire: self.wire.clone(),
            session_id,
            closed: false,
        }))
    }
}

// ── WebDriverSession ──────────────────────────────────────────────────────────

/// One remote Chrome session.
pub struct WebDriverSession {
    wire: WireClient,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }

    async fn call(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        if self.closed {
            return Err(BrowserError::SessionClosed);
        }
        self.wire.call(method, &self.path(suffix), body).await
    }

    /// One lookup attempt. `Ok(None)` when nothing (clickable) matched.
    async fn find_once(&self, locator: &Locator) -> Result<Option<ElementHandle>, BrowserError> {
        let body = json!({ "using": "xpath", "value": xpath_for(locator) });
        let value = match self.call(Method::POST, "/element", Some(body)).await {
            Ok(v) => v,
            Err(e) if e.is_webdriver(BrowserError::NO_SUCH_ELEMENT) => return Ok(None),
            Err(e) => return Err(e),
        };

        let id = value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol {
                detail: format!("element reference missing in {value}"),
            })?;
        let element = ElementHandle(id.to_string());

        if locator.requires_clickable() && !self.is_clickable(&element).await? {
            return Ok(None);
        }
        Ok(Some(element))
    }

    /// Displayed and enabled; a detached element counts as not clickable.
    async fn is_clickable(&self, element: &ElementHandle) -> Result<bool, BrowserError> {
        for probe in ["displayed", "enabled"] {
            let suffix = format!("/element/{}/{probe}", element.id());
            match self.call(Method::GET, &suffix, None).await {
                Ok(Value::Bool(true)) => {}
                Ok(_) => return Ok(false),
                Err(e) if e.is_webdriver(BrowserError::STALE_ELEMENT) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn open(&mut self, url: &str) -> Result<(), BrowserError> {
        self.call(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn find(
        &mut self,
        locator: &Locator,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, BrowserError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(element) = self.find_once(locator).await? {
                return Ok(Some(element));
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(%locator, "element not found within wait bound");
                return Ok(None);
            }
            tokio::time::sleep(FIND_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn type_text(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), BrowserError> {
        let base = format!("/element/{}", element.id());
        self.call(Method::POST, &format!("{base}/clear"), Some(json!({})))
            .await?;
        self.call(Method::POST, &format!("{base}/value"), Some(json!({ "text": text })))
            .await
            .map_err(|e| match e {
                BrowserError::WebDriver { message, .. } => {
                    BrowserError::ElementNotInteractable { reason: message }
                }
                other => other,
            })?;
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), BrowserError> {
        let suffix = format!("/element/{}/click", element.id());
        self.call(Method::POST, &suffix, Some(json!({})))
            .await
            .map_err(|e| match e {
                BrowserError::WebDriver { message, .. } => {
                    BrowserError::ElementNotInteractable { reason: message }
                }
                other => other,
            })?;
        Ok(())
    }

    async fn current_location(&mut self) -> Result<String, BrowserError> {
        let value = self.call(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol {
                detail: format!("url is not a string: {value}"),
            })
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        let result = self.call(Method::DELETE, "", None).await;
        self.closed = true;
        if let Err(e) = &result {
            warn!(session_id = %self.session_id, error = %e, "failed to delete browser session");
        }
        result.map(|_| ())
    }
}

// ── XPath helpers ─────────────────────────────────────────────────────────────

/// XPath for a locator, matching the portal's Vaadin markup.
pub fn xpath_for(locator: &Locator) -> String {
    match locator {
        Locator::Caption(text) => format!(
            "//span[@class='v-button-caption' and text()={}]/ancestor::div[contains(@class, 'v-button')]",
            xpath_literal(text)
        ),
        Locator::InputClass(fragment) => {
            format!("//input[contains(@class, {})]", xpath_literal(fragment))
        }
        Locator::InputType(ty) => format!("//input[@type={}]", xpath_literal(ty)),
        Locator::ControlClass(fragment) => format!(
            "//div[contains(@class, 'v-button') and contains(@class, {})]",
            xpath_literal(fragment)
        ),
    }
}

/// Quote `s` as an XPath 1.0 string literal.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
