use {taskrelay_bus::BusError, thiserror::Error};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// An envelope lacks a mandatory field or is not a task document at all.
    /// Aborts the dispatch it belongs to.
    #[error("malformed envelope: {field}: {reason}")]
    MalformedEnvelope { field: String, reason: String },

    /// A configured keyword or bot name produced an unusable pattern.
    #[error("invalid command pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl DispatchError {
    #[must_use]
    pub fn malformed(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedEnvelope {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
