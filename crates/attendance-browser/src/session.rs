//! Browser capability traits and element predicates.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;

/// Predicate used to locate an element on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Interactive control whose caption equals the text exactly.
    Caption(String),
    /// Input field whose `class` attribute contains the fragment.
    InputClass(String),
    /// Input field whose `type` attribute equals the value.
    InputType(String),
    /// Interactive control whose `class` attribute contains the fragment.
    ControlClass(String),
}

impl Locator {
    pub fn caption(text: impl Into<String>) -> Self {
        Locator::Caption(text.into())
    }

    pub fn input_class(fragment: impl Into<String>) -> Self {
        Locator::InputClass(fragment.into())
    }

    pub fn input_type(ty: impl Into<String>) -> Self {
        Locator::InputType(ty.into())
    }

    pub fn control_class(fragment: impl Into<String>) -> Self {
        Locator::ControlClass(fragment.into())
    }

    /// Caption lookups look for something to click, so they only match
    /// elements that are displayed and enabled.
    pub fn requires_clickable(&self) -> bool {
        matches!(self, Locator::Caption(_))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Caption(t) => write!(f, "caption={t:?}"),
            Locator::InputClass(c) => write!(f, "input.class~={c:?}"),
            Locator::InputType(t) => write!(f, "input.type={t:?}"),
            Locator::ControlClass(c) => write!(f, "control.class~={c:?}"),
        }
    }
}

/// Opaque reference to an element found in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// One exclusively-owned browser session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url` (a full request, never an in-place reload).
    async fn open(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Look for an element matching `locator`, polling for at most `wait`.
    /// `Ok(None)` means nothing matched within the bound.
    async fn find(
        &mut self,
        locator: &Locator,
        wait: Duration,
    ) -> Result<Option<ElementHandle>, BrowserError>;

    /// Clear the field and type `text` into it.
    async fn type_text(&mut self, element: &ElementHandle, text: &str)
        -> Result<(), BrowserError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), BrowserError>;

    async fn current_location(&mut self) -> Result<String, BrowserError>;

    /// End the session. Calling it twice is harmless.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Factory for fresh browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_captions_require_clickable() {
        assert!(Locator::caption("Login").requires_clickable());
        assert!(!Locator::input_type("password").requires_clickable());
        assert!(!Locator::input_class("v-filterselect-input").requires_clickable());
        assert!(!Locator::control_class("primary").requires_clickable());
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::caption("Войти").to_string(), "caption=\"Войти\"");
        assert_eq!(
            Locator::input_type("password").to_string(),
            "input.type=\"password\""
        );
    }
}
