use thiserror::Error;

/// Web API errors that mean the credentials will never work.
const FATAL_API_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "not_allowed_token_type",
];

#[derive(Debug, Error)]
pub enum Error {
    /// Slack answered with `"ok": false`.
    #[error("slack {method} failed: {error}")]
    Api { method: String, error: String },

    #[error("slack {method} returned HTTP {status}")]
    Status {
        method: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("slack adapter misconfigured: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying can never succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Api { error, .. } => FATAL_API_ERRORS.contains(&error.as_str()),
            Self::Config(_) => true,
            Self::Status { .. } | Self::Http(_) | Self::WebSocket(_) | Self::Json(_) => false,
        }
    }
}

impl From<Error> for taskrelay_channels::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Api { method, error } => Self::refused("slack", method, error),
            Error::Config(message) => Self::not_configured("slack", message),
            other => Self::delivery("slack", "call the web api", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
