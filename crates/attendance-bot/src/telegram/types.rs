//! Serde types for the Telegram Bot API.
//!
//! Only the fields the bot reads are deserialized; unknown fields are
//! ignored.

use serde::{Deserialize, Serialize};

use crate::gateway::{Inbound, Keyboard};

/// Generic Telegram API response wrapper.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub description: Option<String>,
    pub result: Option<T>,
}

/// A Telegram Update object from `getUpdates`.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Convert to the gateway's inbound form. Updates without a sender or
    /// without text/data are dropped.
    pub fn into_inbound(self) -> Option<Inbound> {
        if let Some(cb) = self.callback_query {
            let data = cb.data?;
            let (chat, message) = match &cb.message {
                Some(m) => (m.chat.id, Some(m.message_id)),
                // Private chats share the user's id.
                None => (cb.from.id, None),
            };
            return Some(Inbound::Callback {
                id: cb.id,
                chat,
                user: cb.from.id,
                message,
                data,
            });
        }

        let msg = self.message?;
        let user = msg.from.as_ref()?.id;
        Some(Inbound::Text {
            chat: msg.chat.id,
            user,
            message: msg.message_id,
            text: msg.text?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: Option<String>,
}

/// A callback query from an inline keyboard button press.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// Inline keyboard markup for message buttons.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl From<&Keyboard> for InlineKeyboardMarkup {
    fn from(kb: &Keyboard) -> Self {
        Self {
            inline_keyboard: kb
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| InlineKeyboardButton {
                            text: b.text.clone(),
                            callback_data: b.data.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

/// Sent message result (only the id is needed).
#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_text_update() {
        let json = r#"{
            "update_id": 123,
            "message": {
                "message_id": 456,
                "from": {"id": 789, "first_name": "Aruzhan", "is_bot": false},
                "chat": {"id": 789, "type": "private"},
                "date": 1700000000,
                "text": "abcd1234"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_id, 123);
        assert_eq!(
            update.into_inbound(),
            Some(Inbound::Text {
                chat: 789,
                user: 789,
                message: 456,
                text: "abcd1234".into(),
            })
        );
    }

    #[test]
    fn deserialize_callback_update() {
        let json = r#"{
            "update_id": 124,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 789, "first_name": "Aruzhan", "is_bot": false},
                "message": {
                    "message_id": 456,
                    "chat": {"id": 789, "type": "private"},
                    "date": 1700000000
                },
                "data": "mark_now"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(
            update.into_inbound(),
            Some(Inbound::Callback {
                id: "cb-1".into(),
                chat: 789,
                user: 789,
                message: Some(456),
                data: "mark_now".into(),
            })
        );
    }

    #[test]
    fn updates_without_text_are_dropped() {
        let json = r#"{
            "update_id": 125,
            "message": {
                "message_id": 1,
                "from": {"id": 2, "first_name": "A"},
                "chat": {"id": 2, "type": "private"}
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.into_inbound(), None);

        let bare: Update = serde_json::from_str(r#"{"update_id": 1}"#).unwrap();
        assert_eq!(bare.into_inbound(), None);
    }

    #[test]
    fn deserialize_api_response_error() {
        let json = r#"{"ok": false, "description": "Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.description.unwrap(), "Unauthorized");
    }

    #[test]
    fn serialize_keyboard_rows() {
        let kb = Keyboard::new()
            .button("Start Monitoring", "start")
            .button("Status", "status");
        let markup = InlineKeyboardMarkup::from(&kb);
        assert_eq!(markup.inline_keyboard.len(), 2);
        let json = serde_json::to_string(&markup).unwrap();
        assert!(json.contains(r#""callback_data":"start""#));
    }
}
