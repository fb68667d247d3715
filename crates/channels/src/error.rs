use std::error::Error as StdError;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a reply could not be delivered to the requester.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The platform received the call and refused it (unknown room, revoked
    /// token, rate limit).
    #[error("{platform} refused {method}: {reason}")]
    Refused {
        platform: &'static str,
        method: String,
        reason: String,
    },

    /// The adapter lacks a setting it needs to talk to the platform.
    #[error("{platform} adapter is not configured: {missing}")]
    NotConfigured {
        platform: &'static str,
        missing: String,
    },

    /// The reply never reached the platform.
    #[error("{platform} delivery failed while trying to {action}: {source}")]
    Delivery {
        platform: &'static str,
        action: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn refused(
        platform: &'static str,
        method: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Refused {
            platform,
            method: method.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn not_configured(platform: &'static str, missing: impl Into<String>) -> Self {
        Self::NotConfigured {
            platform,
            missing: missing.into(),
        }
    }

    #[must_use]
    pub fn delivery(
        platform: &'static str,
        action: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Delivery {
            platform,
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// Retrying the same reply cannot succeed.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Delivery { .. })
    }
}
