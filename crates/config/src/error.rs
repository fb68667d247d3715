use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required runtime parameter is absent or blank.
    #[error("missing configuration: {parameter} is not set")]
    MissingConfiguration { parameter: String },

    /// A parameter is present but cannot be used.
    #[error("invalid configuration: {parameter}: {message}")]
    InvalidConfiguration { parameter: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn missing(parameter: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            parameter: parameter.into(),
        }
    }

    #[must_use]
    pub fn invalid(parameter: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::InvalidConfiguration {
            parameter: parameter.into(),
            message: message.to_string(),
        }
    }

    /// Name of the offending parameter, when the error is about one.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::MissingConfiguration { parameter }
            | Self::InvalidConfiguration { parameter, .. } => Some(parameter),
            Self::Read { .. } | Self::Message { .. } => None,
        }
    }
}

impl taskrelay_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

taskrelay_common::impl_context!(Error);
