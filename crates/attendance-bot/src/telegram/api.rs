//! Raw HTTP calls to the Telegram Bot API.
//!
//! Wraps reqwest for `sendMessage`, `editMessageText`, `deleteMessage`,
//! `answerCallbackQuery` and `getUpdates`.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::gateway::GatewayError;

use super::types::{ApiResponse, InlineKeyboardMarkup, SentMessage, Update};

/// Upper bound for one Bot API request. Must exceed the long-poll timeout
/// passed to `getUpdates`.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Low-level Telegram Bot API client.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(bot_token: &str) -> Self {
        Self::with_base_url(bot_token, "https://api.telegram.org")
    }

    /// Client against a custom API host.
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: format!("{}/bot{}", base_url.trim_end_matches('/'), bot_token),
        }
    }

    /// POST `body` to `method` and unwrap the `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<Option<T>, GatewayError> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await?;

        let api_resp: ApiResponse<T> = resp.json().await?;
        if !api_resp.ok {
            let desc = api_resp.description.unwrap_or_default();
            return Err(GatewayError::Api(desc));
        }
        Ok(api_resp.result)
    }

    fn markup(reply_markup: Option<InlineKeyboardMarkup>) -> Result<Option<Value>, GatewayError> {
        reply_markup
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::Other(format!("serialize markup: {e}")))
    }

    /// Send a text message. Returns the sent message's id.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<i64, GatewayError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = Self::markup(reply_markup)? {
            body["reply_markup"] = markup;
        }

        debug!("sendMessage to chat_id={chat_id}");
        let sent: Option<SentMessage> = self.call("sendMessage", &body).await.map_err(|e| {
            warn!("sendMessage failed: {e}");
            e
        })?;
        Ok(sent.map(|m| m.message_id).unwrap_or(0))
    }

    /// Replace the text (and keyboard) of a message the bot sent.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), GatewayError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(markup) = Self::markup(reply_markup)? {
            body["reply_markup"] = markup;
        }

        debug!("editMessageText chat_id={chat_id} message_id={message_id}");
        let _: Option<Value> = self.call("editMessageText", &body).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), GatewayError> {
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });
        let _: Option<bool> = self.call("deleteMessage", &body).await?;
        Ok(())
    }

    /// Acknowledge a callback query (dismisses the loading spinner on the button).
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut body = json!({
            "callback_query_id": callback_query_id,
        });
        if let Some(t) = text {
            body["text"] = json!(t);
        }
        let _: Option<bool> = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    /// Long-poll for new updates.
    ///
    /// `offset` should be `last_update_id + 1` to acknowledge previously
    /// received updates.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: u64,
    ) -> Result<Vec<Update>, GatewayError> {
        let mut body = json!({
            "timeout": timeout,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(off) = offset {
            body["offset"] = json!(off);
        }

        let updates: Option<Vec<Update>> = self.call("getUpdates", &body).await?;
        Ok(updates.unwrap_or_default())
    }
}
