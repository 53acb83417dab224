//! Telegram front end for attendance-watch.
//!
//! Turns chat commands and button presses into monitor operations, and
//! monitor events into chat messages. The transport sits behind
//! [`gateway::MessagingGateway`]; [`telegram`] is the Bot API adapter.

pub mod commands;
pub mod dialogue;
pub mod gateway;
pub mod menus;
pub mod router;
pub mod telegram;

#[cfg(test)]
mod testing;

pub use gateway::{GatewayError, Inbound, Keyboard, MessagingGateway};
pub use router::Router;
pub use telegram::TelegramGateway;
