//! Domain types, configuration and persistence for attendance-watch.
//!
//! Holds the account and invitation model, the delay constants the portal
//! monitor relies on, CLI settings, and the JSON-backed record store.

pub mod error;
pub mod models;
pub mod settings;
pub mod store;
pub mod timings;

pub use error::{AttendanceError, Result};
pub use models::{Account, AccountId, AccountUpdate, Invitation, Mode};
