//! Recording gateway for router tests.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::gateway::{ChatId, GatewayError, Keyboard, MessageId, MessagingGateway};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        chat: ChatId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat: ChatId,
        message: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Delete {
        chat: ChatId,
        message: MessageId,
    },
    Answer {
        id: String,
        text: Option<String>,
    },
}

impl Sent {
    /// Text of a sent or edited message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Sent::Message { text, .. } | Sent::Edit { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            Sent::Message { keyboard, .. } | Sent::Edit { keyboard, .. } => keyboard.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingGateway {
    log: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    /// Fail every send and edit.
    pub fail: AtomicBool,
    /// Fail edits with "message is not modified".
    pub not_modified: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<Sent> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Texts of every sent or edited message, in order.
    pub fn texts(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|s| s.text().map(str::to_string))
            .collect()
    }

    pub fn last(&self) -> Option<Sent> {
        self.log()
            .into_iter()
            .filter(|s| s.text().is_some())
            .last()
    }

    pub fn last_text(&self) -> String {
        self.last()
            .and_then(|s| s.text().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn push(&self, sent: Sent) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(sent);
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Api("Forbidden: bot was blocked by the user".into()));
        }
        self.push(Sent::Message {
            chat,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn edit(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Api("Bad Request: message to edit not found".into()));
        }
        if self.not_modified.load(Ordering::SeqCst) {
            return Err(GatewayError::Api(
                "Bad Request: message is not modified".into(),
            ));
        }
        self.push(Sent::Edit {
            chat,
            message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), GatewayError> {
        self.push(Sent::Delete { chat, message });
        Ok(())
    }

    async fn answer_callback(&self, id: &str, text: Option<&str>) -> Result<(), GatewayError> {
        self.push(Sent::Answer {
            id: id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
