//! Parsing of slash commands and inline-button callback data.

/// A control action, reachable from an inline button and from a slash
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Stop,
    SwitchMode,
    Status,
    MarkNow,
    EnterCode,
    AdminPanel,
    AdminGenerate,
    AdminStudents,
    AdminActive,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Start,
        Action::Stop,
        Action::SwitchMode,
        Action::Status,
        Action::MarkNow,
        Action::EnterCode,
        Action::AdminPanel,
        Action::AdminGenerate,
        Action::AdminStudents,
        Action::AdminActive,
    ];

    /// The callback data carried by this action's button.
    pub fn callback_data(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::SwitchMode => "switch_mode",
            Action::Status => "status",
            Action::MarkNow => "mark_now",
            Action::EnterCode => "enter_code",
            Action::AdminPanel => "admin_panel",
            Action::AdminGenerate => "admin_generate",
            Action::AdminStudents => "admin_students",
            Action::AdminActive => "admin_active",
        }
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.callback_data() == data.trim())
    }

    /// Admin-only actions.
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Action::AdminPanel | Action::AdminGenerate | Action::AdminStudents | Action::AdminActive
        )
    }

    /// Actions that act on the caller's own account.
    pub fn requires_registration(&self) -> bool {
        !self.is_admin() && *self != Action::EnterCode
    }
}

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`: welcome screen.
    Welcome,
    /// `/cancel`: abort the registration dialogue.
    Cancel,
    Action(Action),
    Unknown(String),
}

/// Parse a text message. Returns `None` for plain text (dialogue input).
///
/// Accepted forms:
/// - `/start`, `/cancel`
/// - `/stop`, `/status`, `/switch_mode`, `/mark_now`, `/monitor`
/// - `/generate_invitation`, `/list_students`, `/list_active_monitors`,
///   `/admin`
pub fn parse_text_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let cmd = text.split_whitespace().next().unwrap_or(text);
    // Strip bot mention suffix (e.g. "/status@my_bot")
    let cmd = cmd.split('@').next().unwrap_or(cmd);

    let parsed = match cmd.to_lowercase().as_str() {
        "/start" => Command::Welcome,
        "/cancel" => Command::Cancel,
        "/monitor" => Command::Action(Action::Start),
        "/stop" => Command::Action(Action::Stop),
        "/status" => Command::Action(Action::Status),
        "/switch_mode" => Command::Action(Action::SwitchMode),
        "/mark_now" => Command::Action(Action::MarkNow),
        "/admin" => Command::Action(Action::AdminPanel),
        "/generate_invitation" => Command::Action(Action::AdminGenerate),
        "/list_students" => Command::Action(Action::AdminStudents),
        "/list_active_monitors" => Command::Action(Action::AdminActive),
        other => Command::Unknown(other.to_string()),
    };
    Some(parsed)
}

/// Help text sent for unrecognised commands.
pub fn help_text() -> String {
    [
        "Commands:",
        "/start - Main menu or registration",
        "/monitor - Start monitoring",
        "/stop - Stop monitoring",
        "/switch_mode - Toggle automatic/manual",
        "/status - Monitoring status",
        "/mark_now - Mark a pending attendance",
        "/cancel - Abort registration",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_round_trip_for_every_action() {
        for action in Action::ALL {
            assert_eq!(Action::from_callback(action.callback_data()), Some(action));
        }
        assert_eq!(Action::from_callback("approve:1"), None);
        assert_eq!(Action::from_callback(""), None);
    }

    #[test]
    fn test_admin_and_registration_classes() {
        assert!(Action::AdminGenerate.is_admin());
        assert!(!Action::AdminGenerate.requires_registration());
        assert!(!Action::EnterCode.requires_registration());
        assert!(Action::MarkNow.requires_registration());
        assert!(!Action::Start.is_admin());
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse_text_command("ABCD1234"), None);
        assert_eq!(parse_text_command("  student@kbtu.kz "), None);
    }

    #[test]
    fn test_parse_slash_commands() {
        assert_eq!(parse_text_command("/start"), Some(Command::Welcome));
        assert_eq!(parse_text_command("/cancel"), Some(Command::Cancel));
        assert_eq!(
            parse_text_command("/status@kbtu_bot"),
            Some(Command::Action(Action::Status))
        );
        assert_eq!(
            parse_text_command("/STOP now"),
            Some(Command::Action(Action::Stop))
        );
        assert_eq!(
            parse_text_command("/generate_invitation"),
            Some(Command::Action(Action::AdminGenerate))
        );
        assert_eq!(
            parse_text_command("/list_active_monitors"),
            Some(Command::Action(Action::AdminActive))
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_text_command("/frobnicate"),
            Some(Command::Unknown("/frobnicate".into()))
        );
        assert!(help_text().contains("/mark_now"));
    }
}
