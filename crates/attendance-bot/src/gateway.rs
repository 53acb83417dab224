//! Messaging gateway capability.
//!
//! The router talks to the chat transport only through
//! [`MessagingGateway`]; inbound traffic arrives as [`Inbound`] values on an
//! mpsc channel fed by the transport's poller.

use async_trait::async_trait;
use attendance_core::AccountId;
use thiserror::Error;

pub type ChatId = i64;
pub type MessageId = i64;

/// Fragment of the Bot API error returned when an edit would not change
/// anything.
const NOT_MODIFIED: &str = "message is not modified";

/// Errors from gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("gateway shut down")]
    Shutdown,

    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// Editing a message to its current content. Harmless.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, GatewayError::Api(desc) if desc.to_lowercase().contains(NOT_MODIFIED))
    }
}

/// One inline button: a label and the callback data it sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Inline keyboard, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row holding a single button.
    pub fn button(mut self, text: impl Into<String>, data: impl Into<String>) -> Self {
        self.rows.push(vec![Button::new(text, data)]);
        self
    }

    /// Callback data of every button, row by row.
    pub fn callbacks(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.data.as_str())
            .collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.text.as_str())
            .collect()
    }
}

/// Something a user sent to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text {
        chat: ChatId,
        user: AccountId,
        message: MessageId,
        text: String,
    },
    /// Inline button press.
    Callback {
        id: String,
        chat: ChatId,
        user: AccountId,
        /// The message carrying the keyboard, when Telegram reports it.
        message: Option<MessageId>,
        data: String,
    },
}

impl Inbound {
    pub fn user(&self) -> AccountId {
        match self {
            Inbound::Text { user, .. } | Inbound::Callback { user, .. } => *user,
        }
    }
}

/// Outbound half of the chat transport.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a message and return its id.
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, GatewayError>;

    /// Replace a message's text and keyboard.
    async fn edit(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), GatewayError>;

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), GatewayError>;

    /// Acknowledge a button press (dismisses the client's spinner).
    async fn answer_callback(&self, id: &str, text: Option<&str>) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_modified_detection() {
        let e = GatewayError::Api(
            "Bad Request: message is not modified: specified new message content".into(),
        );
        assert!(e.is_not_modified());
        assert!(!GatewayError::Api("Bad Request: chat not found".into()).is_not_modified());
        assert!(!GatewayError::Shutdown.is_not_modified());
    }

    #[test]
    fn test_keyboard_builder() {
        let kb = Keyboard::new()
            .button("Start Monitoring", "start")
            .button("Status", "status");
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.callbacks(), vec!["start", "status"]);
        assert_eq!(kb.labels(), vec!["Start Monitoring", "Status"]);
    }

    #[test]
    fn test_inbound_user() {
        let ev = Inbound::Callback {
            id: "cb".into(),
            chat: 5,
            user: 5,
            message: Some(10),
            data: "status".into(),
        };
        assert_eq!(ev.user(), 5);
    }
}
