//! Standalone watch mode.
//!
//! Monitors a fixed list of users read from a JSON file, all in automatic
//! mode, without the registration dialogue or the record store. Marked
//! attendance is reported to each user's chat when a bot token is set.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use attendance_bot::gateway::ChatId;
use attendance_bot::{MessagingGateway, TelegramGateway};
use attendance_browser::WebDriverLauncher;
use attendance_core::settings::Settings;
use attendance_core::{AccountId, Mode};
use attendance_runtime::events::{event_channel, EventReceiver, FoundStatus, MonitorEvent};
use attendance_runtime::monitor::MonitorConfig;
use attendance_runtime::registry::MonitorRegistry;
use serde::Deserialize;
use tracing::{info, warn};

/// Delay between consecutive monitor launches.
pub const START_STAGGER: Duration = Duration::from_secs(2);

/// One entry of the users file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub telegram_chat_id: Option<ChatId>,
}

pub fn load_users(path: &Path) -> anyhow::Result<Vec<WatchUser>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading users file {}", path.display()))?;
    let users: Vec<WatchUser> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing users file {}", path.display()))?;
    Ok(users)
}

/// Monitor ids are positions in the users file, starting at 1.
fn monitor_config(id: AccountId, user: &WatchUser, settings: &Settings) -> MonitorConfig {
    MonitorConfig {
        account: id,
        username: user.username.clone(),
        password: user.password.clone(),
        mode: Mode::Automatic,
        portal_url: settings.portal_url.clone(),
        skip_login: false,
        timings: settings.timings(),
    }
}

/// Run every user's monitor until Ctrl+C.
pub async fn run(settings: &Settings, users_path: &Path) -> anyhow::Result<()> {
    let users = load_users(users_path)?;
    info!(count = users.len(), path = %users_path.display(), "loaded users");
    if users.is_empty() {
        warn!("users file is empty, nothing to watch");
        return Ok(());
    }

    let gateway: Option<Arc<dyn MessagingGateway>> = match &settings.bot_token {
        Some(token) => Some(Arc::new(TelegramGateway::new(token))),
        None => {
            warn!("no bot token configured, marked attendance will only be logged");
            None
        }
    };

    let launcher = Arc::new(WebDriverLauncher::new(
        &settings.webdriver_url,
        !settings.headed,
    ));
    let (event_tx, event_rx) = event_channel();
    let registry = MonitorRegistry::new(
        launcher,
        event_tx,
        settings.portal_url.clone(),
        settings.timings(),
    );

    let chats: HashMap<AccountId, ChatId> = users
        .iter()
        .zip(1..)
        .filter_map(|(u, id)| u.telegram_chat_id.map(|chat| (id, chat)))
        .collect();
    let pump = tokio::spawn(pump_events(event_rx, gateway, chats));

    let start_all = async {
        for (user, id) in users.iter().zip(1..) {
            info!(account = id, username = %user.username, "starting monitor");
            registry.start(monitor_config(id, user, settings)).await;
            tokio::time::sleep(START_STAGGER).await;
        }
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = start_all => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl+C received; stopping all users");
        }
    }

    registry.stop_all().await;
    drop(registry);
    pump.abort();
    Ok(())
}

/// Forward `marked` events to the user's chat; log everything else.
pub async fn pump_events(
    mut rx: EventReceiver,
    gateway: Option<Arc<dyn MessagingGateway>>,
    chats: HashMap<AccountId, ChatId>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            MonitorEvent::AttendanceFound {
                account,
                username,
                status: FoundStatus::Marked,
            } => {
                info!(account, %username, "attendance marked");
                let (Some(gateway), Some(&chat)) = (gateway.as_ref(), chats.get(&account)) else {
                    continue;
                };
                let text = format!("[{username}] ATTENDANCE MARKED");
                if let Err(e) = gateway.send(chat, &text, None).await {
                    warn!(account, error = %e, "failed to deliver marked notice");
                }
            }
            MonitorEvent::AttendanceFound {
                account, username, ..
            } => {
                info!(account, %username, "attendance available");
            }
            MonitorEvent::Status {
                account,
                username,
                message,
            } => {
                info!(account, %username, "{message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attendance_bot::gateway::{GatewayError, Keyboard, MessageId};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<(ChatId, String)>>);

    #[async_trait]
    impl MessagingGateway for Outbox {
        async fn send(
            &self,
            chat: ChatId,
            text: &str,
            _keyboard: Option<&Keyboard>,
        ) -> Result<MessageId, GatewayError> {
            self.0.lock().unwrap().push((chat, text.to_string()));
            Ok(1)
        }

        async fn edit(
            &self,
            _chat: ChatId,
            _message: MessageId,
            _text: &str,
            _keyboard: Option<&Keyboard>,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn delete(&self, _chat: ChatId, _message: MessageId) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn answer_callback(&self, _id: &str, _text: Option<&str>) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[test]
    fn test_load_users() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("users.json");
        std::fs::write(
            &path,
            r#"[
                {"username": "a@kbtu.kz", "password": "x", "telegram_chat_id": 11},
                {"username": "b@kbtu.kz", "password": "y"}
            ]"#,
        )
        .unwrap();

        let users = load_users(&path).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].telegram_chat_id, Some(11));
        assert_eq!(users[1].telegram_chat_id, None);
    }

    #[test]
    fn test_load_users_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(load_users(&tmp.path().join("missing.json")).is_err());

        let path = tmp.path().join("users.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_users(&path).is_err());
    }

    #[test]
    fn test_monitor_config_is_automatic() {
        let settings = Settings::load_from_args(["attendance-watch", "--refresh-interval", "7"]);
        let user = WatchUser {
            username: "a".into(),
            password: "x".into(),
            telegram_chat_id: None,
        };
        let cfg = monitor_config(3, &user, &settings);
        assert_eq!(cfg.account, 3);
        assert_eq!(cfg.mode, Mode::Automatic);
        assert_eq!(cfg.timings.refresh_interval, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_pump_sends_marked_notice_to_chat() {
        let outbox = Arc::new(Outbox::default());
        let (tx, rx) = event_channel();
        let chats = HashMap::from([(1, 11)]);
        let gateway: Arc<dyn MessagingGateway> = outbox.clone();
        let pump = tokio::spawn(pump_events(rx, Some(gateway), chats));

        for (account, status) in [
            (1, FoundStatus::Marked),
            (2, FoundStatus::Marked),
            (1, FoundStatus::Found),
        ] {
            tx.send(MonitorEvent::AttendanceFound {
                account,
                username: format!("user{account}"),
                status,
            })
            .await
            .unwrap();
        }
        drop(tx);
        pump.await.unwrap();

        let sent = outbox.0.lock().unwrap().clone();
        assert_eq!(sent, vec![(11, "[user1] ATTENDANCE MARKED".to_string())]);
    }
}
