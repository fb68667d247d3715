//! Chat command → task envelope → bus.
//!
//! [`CommandParser`] recognizes an addressed `<keyword> <argument>` command,
//! [`EnvelopeBuilder`] turns it into exactly one [`TaskEnvelope`], and
//! [`DispatchHandler`] acknowledges the requester while publishing the
//! envelope once.

pub mod command;
pub mod envelope;
pub mod error;
pub mod handler;

pub use {
    command::{Command, CommandParser, CommandPattern, RequesterContext},
    envelope::{EnvelopeBuilder, OutputSink, TaskEnvelope, decode},
    error::{DispatchError, Result},
    handler::{DispatchHandler, DispatchOutcome},
};
