use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::AccountId;
use crate::timings::Timings;

/// Entry URL of the university portal.
pub const DEFAULT_PORTAL_URL: &str = "https://wsp.kbtu.kz/RegistrationOnline";

/// Where chromedriver listens by default.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Watch the university portal and mark attendance for registered students
#[derive(Parser, Debug, Clone)]
#[command(
    name = "attendance-watch",
    about = "Watch the university portal and mark attendance for registered students",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Telegram id of the administrator (0 disables admin features)
    #[arg(long, env = "ADMIN_TELEGRAM_ID", default_value = "0")]
    pub admin_id: AccountId,

    /// Directory holding students.json and invitations.json
    #[arg(long, env = "ATTENDANCE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Portal entry URL
    #[arg(long, default_value = DEFAULT_PORTAL_URL)]
    pub portal_url: String,

    /// WebDriver (chromedriver) endpoint
    #[arg(long, env = "WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver_url: String,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headed: bool,

    /// Seconds between portal polls (1-3600)
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub refresh_interval: u64,

    /// Seconds a manual-mode detection waits for confirmation (10-3600)
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(10..=3600))]
    pub confirm_timeout: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// What the process runs.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the Telegram bot (default)
    Bot,
    /// Watch a fixed list of users from a JSON file, without the bot dialogue
    Watch {
        /// JSON list of {username, password, telegram_chat_id}
        #[arg(long, default_value = "users.json")]
        users: PathBuf,
    },
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and resolve derived values.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`load`](Self::load) but with an explicit argument list, so tests
    /// need no subprocess.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Settings::parse_from(args))
    }

    /// Apply `--debug` and fill in the default data directory.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        if settings.data_dir.is_none() {
            settings.data_dir = Some(default_data_dir());
        }
        settings
    }

    /// The selected subcommand, defaulting to the bot.
    pub fn run_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Bot)
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// The administrator id, or `None` when admin features are disabled.
    pub fn admin(&self) -> Option<AccountId> {
        (self.admin_id != 0).then_some(self.admin_id)
    }

    /// Monitor delays with the CLI-tunable intervals applied.
    pub fn timings(&self) -> Timings {
        Timings::with_intervals(self.refresh_interval, self.confirm_timeout)
    }
}

/// `~/.attendance-watch/data`, falling back to the working directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".attendance-watch")
        .join("data")
}

// ── Tests ──────────────────────────────────────────────────────────────────────
