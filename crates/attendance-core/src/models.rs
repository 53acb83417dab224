use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AttendanceError, Result};

/// Opaque operator identity (the chat user id of the account owner).
pub type AccountId = i64;

/// How a monitor reacts when the attendance control appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Click the control as soon as it is found.
    #[default]
    Automatic,
    /// Prompt the operator and click only on explicit confirmation.
    Manual,
}

impl Mode {
    /// The canonical lowercase string identifier for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Automatic => "automatic",
            Mode::Manual => "manual",
        }
    }

    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Mode::Automatic => Mode::Manual,
            Mode::Manual => Mode::Automatic,
        }
    }

    /// Capitalised label used on menu buttons (`"Manual"`, `"Automatic"`).
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Automatic => "Automatic",
            Mode::Manual => "Manual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = AttendanceError;

    /// Case-insensitive construction from `"automatic"` / `"manual"`.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "automatic" | "auto" => Ok(Mode::Automatic),
            "manual" => Ok(Mode::Manual),
            other => Err(AttendanceError::InvalidMode(other.to_string())),
        }
    }
}

/// A registered operator with portal credentials and monitoring preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Operator identity; also the chat the bot replies to.
    pub telegram_id: AccountId,
    /// Portal login name.
    pub username: String,
    /// Portal password, stored as given.
    pub password: String,
    #[serde(default)]
    pub mode: Mode,
    /// Best-effort liveness flag; may be stale after a crash.
    #[serde(default)]
    pub monitoring: bool,
    /// Invitation code consumed at registration.
    #[serde(default)]
    pub invitation_code: String,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// A freshly registered account: automatic mode, not monitoring.
    pub fn new(
        telegram_id: AccountId,
        username: impl Into<String>,
        password: impl Into<String>,
        invitation_code: impl Into<String>,
    ) -> Self {
        Self {
            telegram_id,
            username: username.into(),
            password: password.into(),
            mode: Mode::Automatic,
            monitoring: false,
            invitation_code: invitation_code.into(),
            registered_at: Utc::now(),
        }
    }

    /// Apply the set fields of `update` in place.
    pub fn apply(&mut self, update: &AccountUpdate) {
        if let Some(mode) = update.mode {
            self.mode = mode;
        }
        if let Some(monitoring) = update.monitoring {
            self.monitoring = monitoring;
        }
    }
}

/// Partial update for the mutable fields of an [`Account`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    pub mode: Option<Mode>,
    pub monitoring: Option<bool>,
}

impl AccountUpdate {
    pub fn mode(mode: Mode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn monitoring(monitoring: bool) -> Self {
        Self {
            monitoring: Some(monitoring),
            ..Self::default()
        }
    }
}

/// A single-use registration token. The code itself is the store key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub created_by: AccountId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub used_by: Option<AccountId>,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn new(created_by: AccountId) -> Self {
        Self {
            created_by,
            created_at: Utc::now(),
            used_by: None,
            used_at: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_by.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Mode ──────────────────────────────────────────────────────────────

    #[test]
    fn test_mode_from_str_valid() {
        assert_eq!("automatic".parse::<Mode>().unwrap(), Mode::Automatic);
        assert_eq!("Manual".parse::<Mode>().unwrap(), Mode::Manual);
        assert_eq!(" AUTO ".parse::<Mode>().unwrap(), Mode::Automatic);
    }

    #[test]
    fn test_mode_from_str_invalid() {
        let err = "sometimes".parse::<Mode>().unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidMode(_)));
    }

    #[test]
    fn test_mode_toggle_and_labels() {
        assert_eq!(Mode::Automatic.toggled(), Mode::Manual);
        assert_eq!(Mode::Manual.toggled(), Mode::Automatic);
        assert_eq!(Mode::Manual.label(), "Manual");
        assert_eq!(Mode::Automatic.to_string(), "automatic");
    }

    #[test]
    fn test_mode_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Manual).unwrap(), "\"manual\"");
        let m: Mode = serde_json::from_str("\"automatic\"").unwrap();
        assert_eq!(m, Mode::Automatic);
    }

    // ── Account ───────────────────────────────────────────────────────────

    #[test]
    fn test_account_defaults() {
        let acc = Account::new(7, "student@kbtu.kz", "secret", "ABCD1234");
        assert_eq!(acc.mode, Mode::Automatic);
        assert!(!acc.monitoring);
        assert_eq!(acc.invitation_code, "ABCD1234");
    }

    #[test]
    fn test_account_apply_partial_update() {
        let mut acc = Account::new(7, "u", "p", "C");
        acc.apply(&AccountUpdate::monitoring(true));
        assert!(acc.monitoring);
        assert_eq!(acc.mode, Mode::Automatic);

        acc.apply(&AccountUpdate::mode(Mode::Manual));
        assert_eq!(acc.mode, Mode::Manual);
        assert!(acc.monitoring);
    }

    #[test]
    fn test_account_deserialize_missing_optional_fields() {
        let json = r#"{"telegram_id": 5, "username": "u", "password": "p"}"#;
        let acc: Account = serde_json::from_str(json).unwrap();
        assert_eq!(acc.mode, Mode::Automatic);
        assert!(!acc.monitoring);
        assert!(acc.invitation_code.is_empty());
    }

    // ── Invitation ────────────────────────────────────────────────────────

    #[test]
    fn test_invitation_new_is_unused() {
        let inv = Invitation::new(1);
        assert!(!inv.is_used());
        assert!(inv.used_at.is_none());
    }
}
