//! Error types for the attendance-browser crate.

use thiserror::Error;

/// Errors that can occur during browser operations.
///
/// "Element not found" is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A browser session could not be created.
    #[error("failed to launch browser session at {endpoint}: {reason}")]
    LaunchFailed { endpoint: String, reason: String },

    /// The WebDriver endpoint could not be reached.
    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebDriver server answered with an error object.
    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    /// A response did not have the expected shape.
    #[error("WebDriver protocol error: {detail}")]
    Protocol { detail: String },

    /// The element went away or cannot be interacted with.
    #[error("element not interactable: {reason}")]
    ElementNotInteractable { reason: String },

    /// A command got no answer within its bound.
    #[error("WebDriver command '{command}' timed out after {limit:?}")]
    Timeout {
        command: String,
        limit: std::time::Duration,
    },

    /// The session was already closed.
    #[error("browser session closed")]
    SessionClosed,
}

impl BrowserError {
    /// W3C error code for a lookup that matched nothing.
    pub const NO_SUCH_ELEMENT: &'static str = "no such element";

    /// W3C error code for an element detached from the page.
    pub const STALE_ELEMENT: &'static str = "stale element reference";

    /// `true` when the server reported the given W3C error code.
    pub fn is_webdriver(&self, code: &str) -> bool {
        matches!(self, BrowserError::WebDriver { error, .. } if error == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_webdriver_matches_code() {
        let err = BrowserError::WebDriver {
            error: "no such element".into(),
            message: "Unable to locate element".into(),
        };
        assert!(err.is_webdriver(BrowserError::NO_SUCH_ELEMENT));
        assert!(!err.is_webdriver(BrowserError::STALE_ELEMENT));
        assert!(!BrowserError::SessionClosed.is_webdriver(BrowserError::NO_SUCH_ELEMENT));
    }

    #[test]
    fn test_launch_failed_display() {
        let err = BrowserError::LaunchFailed {
            endpoint: "http://localhost:9515".into(),
            reason: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("localhost:9515"));
        assert!(msg.contains("connection refused"));
    }
}
