//! Chat platform boundary.
//!
//! Each chat adapter (Slack, the local shell) turns platform messages into
//! [`ChatEvent`]s for a [`ChatEventSink`] and implements [`ChatOutbound`] so
//! the relay can answer the requester.

pub mod error;
pub mod gating;
pub mod plugin;

pub use {
    error::{Error, Result},
    plugin::{ChatEvent, ChatEventSink, ChatOutbound},
};
