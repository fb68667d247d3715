//! Slack adapter.
//!
//! Inbound messages arrive over Socket Mode (a WebSocket opened with the
//! app-level token), so no public HTTP endpoint is needed. Replies go out
//! through the Web API with the bot token.

pub mod api;
pub mod error;
pub mod socket;

pub use {
    api::{BotIdentity, SlackApi},
    error::{Error, Result},
    socket::SocketModeListener,
};
