//! Notification router.
//!
//! Bridges the chat transport and the monitors:
//!
//! - inbound messages and button presses become registry/store operations
//!   and replies ([`Router::handle`])
//! - monitor events become outbound messages ([`Router::handle_event`])
//! - a periodic watchdog reports monitors that died on their own
//!   ([`Router::watchdog_pass`])
//!
//! Delivery failures are logged and dropped. Nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use attendance_core::store::RecordStore;
use attendance_core::{Account, AccountId, AccountUpdate, AttendanceError};
use attendance_runtime::events::{EventReceiver, FoundStatus, MonitorEvent};
use attendance_runtime::registry::{MonitorRegistry, StartOutcome};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::commands::{help_text, parse_text_command, Action, Command};
use crate::dialogue::{Dialogues, Stage};
use crate::gateway::{ChatId, Inbound, Keyboard, MessageId, MessagingGateway};
use crate::menus;

/// Delay before the first watchdog sweep.
pub const WATCHDOG_FIRST: Duration = Duration::from_secs(30);
/// Interval between later sweeps.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);

const NOT_REGISTERED: &str = "You are not registered. Use /start to begin.";
const ACCESS_DENIED: &str = "Access denied.";
const INTERNAL_FAILURE: &str = "Something went wrong. Please try again later.";
const INVALID_CODE: &str = "Invalid invitation code. Please try again or contact admin.";
const USED_CODE: &str = "This invitation code has already been used.";

/// Where a reply goes: a new message, or an edit of the message whose
/// button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Send(ChatId),
    Edit(ChatId, MessageId),
}

pub struct Router {
    store: Arc<dyn RecordStore>,
    registry: Arc<MonitorRegistry>,
    gateway: Arc<dyn MessagingGateway>,
    admin: Option<AccountId>,
    dialogues: Dialogues,
}

impl Router {
    pub fn new(
        store: Arc<dyn RecordStore>,
        registry: Arc<MonitorRegistry>,
        gateway: Arc<dyn MessagingGateway>,
        admin: Option<AccountId>,
    ) -> Self {
        Self {
            store,
            registry,
            gateway,
            admin,
            dialogues: Dialogues::new(),
        }
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    fn is_admin(&self, user: AccountId) -> bool {
        self.admin == Some(user)
    }

    // ── Loops ─────────────────────────────────────────────────────────────

    /// Handle inbound traffic until the channel closes.
    pub async fn run_inbound(self: Arc<Self>, mut rx: mpsc::Receiver<Inbound>) {
        while let Some(inbound) = rx.recv().await {
            self.handle(inbound).await;
        }
        debug!("inbound channel closed");
    }

    /// Drain monitor events until every sender is gone.
    pub async fn run_events(self: Arc<Self>, mut rx: EventReceiver) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
        debug!("event channel closed");
    }

    /// Sweep dead monitors after `first`, then every `every`, until
    /// `cancel` fires.
    pub async fn run_watchdog(
        self: Arc<Self>,
        first: Duration,
        every: Duration,
        mut cancel: watch::Receiver<bool>,
    ) {
        let mut delay = first;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => return,
            }
            if *cancel.borrow() {
                return;
            }
            self.watchdog_pass().await;
            delay = every;
        }
    }

    // ── Monitor events ────────────────────────────────────────────────────

    pub async fn handle_event(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::AttendanceFound {
                account,
                username,
                status: FoundStatus::Marked,
            } => {
                info!(account, %username, "attendance marked");
                self.respond(
                    Reply::Send(account),
                    &format!("[{username}] Attendance Marked."),
                    None,
                )
                .await;
            }
            MonitorEvent::AttendanceFound {
                account,
                username,
                status: FoundStatus::Found,
            } => {
                info!(account, %username, "attendance available, awaiting confirmation");
                self.respond(
                    Reply::Send(account),
                    &format!("[{username}] Attendance available! Press the button to mark."),
                    Some(&menus::mark_now_keyboard()),
                )
                .await;
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

    /// Remove dead monitors, clear their flags and tell their owners.
    pub async fn watchdog_pass(&self) -> Vec<AccountId> {
        let dead = self.registry.sweep().await;
        for &id in &dead {
            let account = self.load_account(id);
            let username = account
                .as_ref()
                .map(|a| a.username.clone())
                .unwrap_or_else(|| id.to_string());
            warn!(account = id, %username, "monitor died, cleaning up");

            if let Err(e) = self.store.update_account(id, AccountUpdate::monitoring(false)) {
                warn!(account = id, error = %e, "failed to clear monitoring flag");
            }
            let keyboard = account.map(|a| menus::main_menu(&a, false, self.is_admin(id)));
            self.respond(
                Reply::Send(id),
                &format!("[{username}] Monitor crashed and stopped. Press Start Monitoring to restart."),
                keyboard.as_ref(),
            )
            .await;
        }
        dead
    }

    // ── Inbound ───────────────────────────────────────────────────────────

    pub async fn handle(&self, inbound: Inbound) {
        match inbound {
            Inbound::Text {
                chat,
                user,
                message,
                text,
            } => self.handle_text(chat, user, message, &text).await,
            Inbound::Callback {
                id,
                chat,
                user,
                message,
                data,
            } => {
                let Some(action) = Action::from_callback(&data) else {
                    debug!(user, %data, "unknown callback data");
                    self.answer(&id, Some("Unknown action")).await;
                    return;
                };
                self.answer(&id, None).await;
                let target = match message {
                    Some(message) => Reply::Edit(chat, message),
                    None => Reply::Send(chat),
                };
                self.dispatch(target, user, action).await;
            }
        }
    }

    async fn handle_text(&self, chat: ChatId, user: AccountId, message: MessageId, text: &str) {
        match parse_text_command(text) {
            Some(Command::Welcome) => self.welcome(chat, user).await,
            Some(Command::Cancel) => {
                self.dialogues.clear(user);
                self.respond(Reply::Send(chat), "Cancelled.", None).await;
            }
            Some(Command::Action(action)) => self.dispatch(Reply::Send(chat), user, action).await,
            Some(Command::Unknown(cmd)) => {
                let reply = format!("Unknown command: {cmd}\n\n{}", help_text());
                self.respond(Reply::Send(chat), &reply, None).await;
            }
            None => self.dialogue_input(chat, user, message, text).await,
        }
    }

    async fn welcome(&self, chat: ChatId, user: AccountId) {
        self.dialogues.clear(user);
        match self.store.get_account(user) {
            Ok(Some(account)) => {
                let menu = self.menu_for(&account).await;
                let text = format!("[{}] Welcome back!", account.username);
                self.respond(Reply::Send(chat), &text, Some(&menu)).await;
            }
            Ok(None) => {
                let menu = menus::welcome_menu(self.is_admin(user));
                self.respond(
                    Reply::Send(chat),
                    "Welcome to KBTU Attendance Bot!\nChoose an option:",
                    Some(&menu),
                )
                .await;
            }
            Err(e) => self.internal_failure(Reply::Send(chat), user, &e).await,
        }
    }

    async fn dispatch(&self, target: Reply, user: AccountId, action: Action) {
        debug!(user, action = action.callback_data(), "dispatching action");
        if action.is_admin() {
            if !self.is_admin(user) {
                warn!(user, action = action.callback_data(), "admin action denied");
                self.respond(target, ACCESS_DENIED, None).await;
                return;
            }
            self.admin_action(target, user, action).await;
            return;
        }
        if action == Action::EnterCode {
            self.enter_code(target, user).await;
            return;
        }

        let account = match self.store.get_account(user) {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.respond(target, NOT_REGISTERED, None).await;
                return;
            }
            Err(e) => {
                self.internal_failure(target, user, &e).await;
                return;
            }
        };
        self.account_action(target, account, action).await;
    }

    // ── Account actions ───────────────────────────────────────────────────

    async fn account_action(&self, target: Reply, mut account: Account, action: Action) {
        let id = account.telegram_id;
        let admin = self.is_admin(id);
        let username = account.username.clone();

        match action {
            Action::Start => match self.registry.start_account(&account).await {
                StartOutcome::AlreadyActive => {
                    let menu = menus::main_menu(&account, true, admin);
                    let text = format!("[{username}] Monitoring is already active.");
                    self.respond(target, &text, Some(&menu)).await;
                }
                StartOutcome::Started => {
                    if let Err(e) = self.store.update_account(id, AccountUpdate::monitoring(true)) {
                        warn!(account = id, error = %e, "failed to persist monitoring flag");
                    }
                    account.monitoring = true;
                    let menu = menus::main_menu(&account, true, admin);
                    let text = format!("[{username}] Monitoring started. Mode: {}.", account.mode);
                    self.respond(target, &text, Some(&menu)).await;
                }
            },
            Action::Stop => {
                self.registry.stop(id).await;
                if let Err(e) = self.store.update_account(id, AccountUpdate::monitoring(false)) {
                    warn!(account = id, error = %e, "failed to persist monitoring flag");
                }
                account.monitoring = false;
                let menu = menus::main_menu(&account, false, admin);
                let text = format!("[{username}] Monitoring stopped.");
                self.respond(target, &text, Some(&menu)).await;
            }
            Action::SwitchMode => {
                let mode = account.mode.toggled();
                if let Err(e) = self.store.update_account(id, AccountUpdate::mode(mode)) {
                    self.internal_failure(target, id, &e).await;
                    return;
                }
                self.registry.set_mode(id, mode).await;
                account.mode = mode;
                info!(account = id, %mode, "mode switched");
                let menu = self.menu_for(&account).await;
                let text = format!("[{username}] Mode switched to {mode}.");
                self.respond(target, &text, Some(&menu)).await;
            }
            Action::Status => {
                let active = self.registry.is_active(id).await;
                let menu = menus::main_menu(&account, active, admin);
                let text = format!(
                    "[{username}] Status\nMode: {}\nMonitoring: {}",
                    account.mode,
                    if active { "active" } else { "inactive" }
                );
                self.respond(target, &text, Some(&menu)).await;
            }
            Action::MarkNow => {
                let text = match self.registry.mark_now(id).await {
                    None => format!("[{username}] Monitor is not running."),
                    Some(true) => format!("[{username}] Attendance Marked."),
                    Some(false) => format!("[{username}] Failed to mark. Button may have expired."),
                };
                self.respond(target, &text, None).await;
            }
            other => debug!(account = id, action = other.callback_data(), "not an account action"),
        }
    }

    // ── Admin actions ─────────────────────────────────────────────────────

    async fn admin_action(&self, target: Reply, user: AccountId, action: Action) {
        let menu = menus::admin_menu();
        match action {
            Action::AdminPanel => self.respond(target, "Admin Panel", Some(&menu)).await,
            Action::AdminGenerate => match self.store.create_invitation(user) {
                Ok(code) => {
                    info!(admin = user, %code, "invitation created");
                    let text = format!("New invitation code:\n\n{code}\n\nShare this with a student.");
                    self.respond(target, &text, Some(&menu)).await;
                }
                Err(e) => self.internal_failure(target, user, &e).await,
            },
            Action::AdminStudents => {
                let accounts = match self.store.get_all_accounts() {
                    Ok(accounts) => accounts,
                    Err(e) => {
                        self.internal_failure(target, user, &e).await;
                        return;
                    }
                };
                if accounts.is_empty() {
                    self.respond(target, "No registered students.", Some(&menu)).await;
                    return;
                }
                let active = self.registry.active_accounts().await;
                let lines: Vec<String> = accounts
                    .iter()
                    .map(|a| {
                        let status = if active.contains(&a.telegram_id) {
                            "ACTIVE"
                        } else {
                            "inactive"
                        };
                        format!("• {} | {} | {status}", a.username, a.mode)
                    })
                    .collect();
                let text = format!("Registered Students:\n\n{}", lines.join("\n"));
                self.respond(target, &text, Some(&menu)).await;
            }
            Action::AdminActive => {
                let lines: Vec<String> = self
                    .registry
                    .active_accounts()
                    .await
                    .into_iter()
                    .filter_map(|id| self.load_account(id))
                    .map(|a| format!("• {} | {}", a.username, a.mode))
                    .collect();
                if lines.is_empty() {
                    self.respond(target, "No active monitors.", Some(&menu)).await;
                } else {
                    let text = format!("Active Monitors:\n\n{}", lines.join("\n"));
                    self.respond(target, &text, Some(&menu)).await;
                }
            }
            other => debug!(user, action = other.callback_data(), "not an admin action"),
        }
    }

    // ── Registration dialogue ─────────────────────────────────────────────

    async fn enter_code(&self, target: Reply, user: AccountId) {
        match self.store.get_account(user) {
            Ok(Some(account)) => {
                let menu = self.menu_for(&account).await;
                let text = format!("[{}] You are already registered!", account.username);
                self.respond(target, &text, Some(&menu)).await;
            }
            Ok(None) => {
                self.dialogues.begin(user);
                self.respond(target, "Please enter your invitation code:", None)
                    .await;
            }
            Err(e) => self.internal_failure(target, user, &e).await,
        }
    }

    async fn dialogue_input(&self, chat: ChatId, user: AccountId, message: MessageId, text: &str) {
        let Some(stage) = self.dialogues.get(user) else {
            debug!(user, "ignoring text outside a dialogue");
            return;
        };
        let reply = Reply::Send(chat);

        match stage {
            Stage::AwaitingCode => {
                let code = text.trim().to_uppercase();
                match self.store.get_invitation(&code) {
                    Ok(None) => self.respond(reply, INVALID_CODE, None).await,
                    Ok(Some(invitation)) if invitation.is_used() => {
                        self.respond(reply, USED_CODE, None).await;
                    }
                    Ok(Some(_)) => {
                        self.dialogues.set(user, Stage::AwaitingUsername { code });
                        self.respond(
                            reply,
                            "Code accepted! Please enter your KBTU username (email):",
                            None,
                        )
                        .await;
                    }
                    Err(e) => self.internal_failure(reply, user, &e).await,
                }
            }
            Stage::AwaitingUsername { code } => {
                let username = text.trim().to_string();
                self.dialogues
                    .set(user, Stage::AwaitingPassword { code, username });
                self.respond(reply, "Now enter your KBTU password:", None).await;
            }
            Stage::AwaitingPassword { code, username } => {
                // The password must not linger in the chat history.
                if let Err(e) = self.gateway.delete(chat, message).await {
                    debug!(user, error = %e, "could not delete password message");
                }
                self.dialogues.clear(user);

                match self.store.register(user, &username, text.trim(), &code) {
                    Ok(account) => {
                        info!(account = user, %username, "registration complete");
                        let menu = menus::main_menu(&account, false, self.is_admin(user));
                        let text = format!(
                            "[{username}] Registration complete!\nMode: {}\n\nUse the buttons below to start monitoring.",
                            account.mode.label()
                        );
                        self.respond(reply, &text, Some(&menu)).await;
                    }
                    Err(AttendanceError::InvitationUsed(_)) => {
                        let text = format!("{USED_CODE} Use /start to try another code.");
                        self.respond(reply, &text, None).await;
                    }
                    Err(AttendanceError::InvalidInvitation(_)) => {
                        let text = format!("{INVALID_CODE} Use /start to try again.");
                        self.respond(reply, &text, None).await;
                    }
                    Err(e) => self.internal_failure(reply, user, &e).await,
                }
            }
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn load_account(&self, id: AccountId) -> Option<Account> {
        match self.store.get_account(id) {
            Ok(account) => account,
            Err(e) => {
                warn!(account = id, error = %e, "failed to load account");
                None
            }
        }
    }

    async fn menu_for(&self, account: &Account) -> Keyboard {
        let active = self.registry.is_active(account.telegram_id).await;
        menus::main_menu(account, active, self.is_admin(account.telegram_id))
    }

    async fn internal_failure(&self, target: Reply, user: AccountId, e: &AttendanceError) {
        error!(user, error = %e, "store operation failed");
        self.respond(target, INTERNAL_FAILURE, None).await;
    }

    async fn answer(&self, id: &str, text: Option<&str>) {
        if let Err(e) = self.gateway.answer_callback(id, text).await {
            debug!(error = %e, "answerCallbackQuery failed");
        }
    }

    async fn respond(&self, target: Reply, text: &str, keyboard: Option<&Keyboard>) {
        let result = match target {
            Reply::Send(chat) => self.gateway.send(chat, text, keyboard).await.map(|_| ()),
            Reply::Edit(chat, message) => self.gateway.edit(chat, message, text, keyboard).await,
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_modified() => {}
            Err(e) => warn!(?target, error = %e, "reply delivery failed"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
