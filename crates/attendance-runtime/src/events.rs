//! Events emitted by monitors.
//!
//! Monitors never call into the messaging layer directly; they enqueue
//! [`MonitorEvent`]s on an mpsc channel and a consumer bound to the
//! messaging gateway drains it. Events of one account arrive in the order
//! the monitor produced them.

use attendance_core::AccountId;
use tokio::sync::mpsc;

/// Buffer size of the monitor → router channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub type EventSender = mpsc::Sender<MonitorEvent>;
pub type EventReceiver = mpsc::Receiver<MonitorEvent>;

/// Create the channel shared by every monitor of a process.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// What happened to the attendance control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundStatus {
    /// The control was clicked.
    Marked,
    /// The control is available and waits for manual confirmation.
    Found,
}

impl FoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoundStatus::Marked => "marked",
            FoundStatus::Found => "found",
        }
    }
}

/// A single notification from a monitor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    AttendanceFound {
        account: AccountId,
        username: String,
        status: FoundStatus,
    },
    /// Free-text progress line. Only for logs and people, never for control
    /// decisions.
    Status {
        account: AccountId,
        username: String,
        message: String,
    },
}

impl MonitorEvent {
    pub fn account(&self) -> AccountId {
        match self {
            MonitorEvent::AttendanceFound { account, .. } | MonitorEvent::Status { account, .. } => {
                *account
            }
        }
    }

    pub fn username(&self) -> &str {
        match self {
            MonitorEvent::AttendanceFound { username, .. }
            | MonitorEvent::Status { username, .. } => username,
        }
    }
}
