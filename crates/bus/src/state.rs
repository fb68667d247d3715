//! Connection state machine for the bus link.
//!
//! ```text
//! Disconnected --ConnectRequested--> Connecting --Connected--> Authenticating --Authenticated--> Ready
//!       ^                               |                            |                            |
//!       +---------ConnectFailed---------+                         Dropped                      Dropped
//!                                                                    v                            v
//!                                   Authenticating <--Reconnected-- Reconnecting <----------------+
//!
//! any non-terminal state --AuthRejected--> Failed (terminal)
//! ```
//!
//! `Ready` also goes back to `Authenticating` on `Connected`/`Reconnected`:
//! the bus may swap the underlying connection without a visible drop, and
//! the credential is re-issued every time rather than assumed cached.

use serde::Serialize;

/// Lifecycle state of the shared bus link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Reconnecting,
    /// Authentication was rejected. Terminal.
    Failed,
}

impl std::fmt::Display for BusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle notifications a transport reports about its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Reconnected,
    Dropped,
}

/// Everything that can move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    ConnectRequested,
    ConnectFailed,
    Connected,
    Reconnected,
    Authenticated,
    AuthRejected,
    Dropped,
}

impl From<LinkEvent> for BusEvent {
    fn from(event: LinkEvent) -> Self {
        match event {
            LinkEvent::Connected => Self::Connected,
            LinkEvent::Reconnected => Self::Reconnected,
            LinkEvent::Dropped => Self::Dropped,
        }
    }
}

impl BusState {
    /// The state reached by applying `event`, or `None` when the event means
    /// nothing in this state and should be ignored.
    #[must_use]
    pub fn next(self, event: BusEvent) -> Option<Self> {
        use {BusEvent as E, BusState as S};

        match (self, event) {
            (S::Failed, _) => None,
            (_, E::AuthRejected) => Some(S::Failed),

            (S::Disconnected, E::ConnectRequested) => Some(S::Connecting),
            (S::Connecting, E::Connected) => Some(S::Authenticating),
            (S::Connecting, E::ConnectFailed | E::Dropped) => Some(S::Disconnected),

            (S::Reconnecting, E::Reconnected | E::Connected) => Some(S::Authenticating),
            (S::Reconnecting, E::ConnectFailed) => Some(S::Reconnecting),

            (S::Authenticating, E::Authenticated) => Some(S::Ready),
            (S::Authenticating, E::Dropped) => Some(S::Reconnecting),

            (S::Ready, E::Connected | E::Reconnected) => Some(S::Authenticating),
            (S::Ready, E::Dropped) => Some(S::Reconnecting),

            _ => None,
        }
    }

    /// Whether a publish may be sent right now.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// States in which the link is being (re-)established and a publish must
    /// fail fast with `BusNotReady`.
    #[must_use]
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Reconnecting
        )
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::{BusEvent as E, BusState as S},
        rstest::rstest,
    };

    fn run(start: S, events: &[E]) -> S {
        events
            .iter()
            .fold(start, |state, event| state.next(*event).unwrap_or(state))
    }

    #[test]
    fn initial_connect_reaches_ready() {
        let end = run(S::Disconnected, &[
            E::ConnectRequested,
            E::Connected,
            E::Authenticated,
        ]);
        assert_eq!(end, S::Ready);
    }

    #[test]
    fn drop_and_reconnect_requires_reauthentication() {
        assert_eq!(S::Ready.next(E::Dropped), Some(S::Reconnecting));
        assert_eq!(S::Reconnecting.next(E::Reconnected), Some(S::Authenticating));
        // No shortcut from Reconnecting straight to Ready.
        assert_eq!(S::Reconnecting.next(E::Authenticated), None);
    }

    #[test]
    fn transparent_reconnect_while_ready_reauthenticates() {
        assert_eq!(S::Ready.next(E::Reconnected), Some(S::Authenticating));
        assert_eq!(S::Ready.next(E::Connected), Some(S::Authenticating));
    }

    #[rstest]
    #[case(S::Disconnected)]
    #[case(S::Connecting)]
    #[case(S::Authenticating)]
    #[case(S::Ready)]
    #[case(S::Reconnecting)]
    fn auth_rejection_is_terminal_from_anywhere(#[case] start: S) {
        assert_eq!(start.next(E::AuthRejected), Some(S::Failed));
    }

    #[rstest]
    #[case(E::ConnectRequested)]
    #[case(E::Connected)]
    #[case(E::Reconnected)]
    #[case(E::Authenticated)]
    #[case(E::Dropped)]
    fn failed_ignores_everything(#[case] event: E) {
        assert_eq!(S::Failed.next(event), None);
    }

    #[test]
    fn failed_connect_returns_to_disconnected() {
        assert_eq!(S::Connecting.next(E::ConnectFailed), Some(S::Disconnected));
        assert_eq!(S::Reconnecting.next(E::ConnectFailed), Some(S::Reconnecting));
    }

    #[test]
    fn transitional_states() {
        assert!(S::Connecting.is_transitional());
        assert!(S::Authenticating.is_transitional());
        assert!(S::Reconnecting.is_transitional());
        assert!(!S::Ready.is_transitional());
        assert!(!S::Disconnected.is_transitional());
        assert!(!S::Failed.is_transitional());
    }
}
