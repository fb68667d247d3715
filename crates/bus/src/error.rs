use std::time::Duration;

use {crate::state::BusState, thiserror::Error};

/// Errors surfaced to callers of [`crate::TaskPublisher::publish`].
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus cannot take the message: connecting failed, the link dropped
    /// mid-publish, or authentication was rejected for good.
    #[error("bus unavailable: {reason}")]
    Unavailable { reason: String },

    /// The link is between connections (connecting, authenticating,
    /// reconnecting). Publishes fail fast rather than wait.
    #[error("bus not ready: link is {state}")]
    NotReady { state: BusState },

    /// The operation did not finish within its bound.
    #[error("bus operation timed out after {after:?}")]
    Timeout { after: Duration },
}

impl BusError {
    #[must_use]
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }
}

/// Errors reported by a [`crate::BusLink`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The transport went away (refused, reset, timed out). Recoverable by
    /// reconnecting.
    #[error("link lost: {0}")]
    Lost(String),

    /// The bus answered and said no (bad credential, unknown command).
    #[error("rejected by bus: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
