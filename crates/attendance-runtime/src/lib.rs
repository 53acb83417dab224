//! Runtime layer for attendance-watch.
//!
//! Runs one [`Monitor`](monitor::Monitor) task per account against the
//! portal, keeps at most one live monitor per account in the
//! [`MonitorRegistry`](registry::MonitorRegistry), and reports what the
//! monitors see as [`MonitorEvent`](events::MonitorEvent)s on an mpsc channel.

pub mod events;
pub mod monitor;
pub mod registry;

pub use events::{FoundStatus, MonitorEvent};
pub use monitor::{Monitor, MonitorConfig, MonitorState};
pub use registry::{MonitorRegistry, StartOutcome};
