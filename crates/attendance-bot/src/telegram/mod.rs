//! Telegram Bot API gateway.
//!
//! Implements [`MessagingGateway`] with direct HTTP calls for outbound
//! traffic and a long-polling task for inbound updates.

pub mod api;
pub mod poller;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::gateway::{ChatId, GatewayError, Inbound, Keyboard, MessageId, MessagingGateway};

use self::api::TelegramApi;
use self::types::InlineKeyboardMarkup;

/// Seconds a `getUpdates` call may block server-side.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram gateway. Cheap to clone; clones share one HTTP client.
#[derive(Clone)]
pub struct TelegramGateway {
    api: Arc<TelegramApi>,
}

impl TelegramGateway {
    pub fn new(bot_token: &str) -> Self {
        Self::with_api(TelegramApi::new(bot_token))
    }

    pub fn with_api(api: TelegramApi) -> Self {
        Self { api: Arc::new(api) }
    }

    /// Spawn the long-poll task feeding `inbound_tx` until `cancel` fires.
    pub fn spawn_poller(
        &self,
        inbound_tx: mpsc::Sender<Inbound>,
        cancel: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            poller::poll_loop(api, DEFAULT_POLL_TIMEOUT_SECS, inbound_tx, cancel).await;
        })
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, GatewayError> {
        self.api
            .send_message(chat, text, keyboard.map(InlineKeyboardMarkup::from))
            .await
    }

    async fn edit(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), GatewayError> {
        self.api
            .edit_message_text(chat, message, text, keyboard.map(InlineKeyboardMarkup::from))
            .await
    }

    async fn delete(&self, chat: ChatId, message: MessageId) -> Result<(), GatewayError> {
        self.api.delete_message(chat, message).await
    }

    async fn answer_callback(&self, id: &str, text: Option<&str>) -> Result<(), GatewayError> {
        self.api.answer_callback_query(id, text).await
    }
}
