use serde::{Deserialize, Serialize};

/// Mention activation mode for rooms.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MentionMode {
    /// Bot must be addressed by name or mention to respond.
    #[default]
    Mention,
    /// Bot responds to unaddressed commands too.
    Always,
    /// Bot does not respond in rooms, only in direct messages.
    None,
}

impl MentionMode {
    /// Whether a message in this context is considered at all.
    #[must_use]
    pub fn listens(self, is_direct: bool) -> bool {
        is_direct || self != Self::None
    }

    /// Whether a command that does not address the bot is still accepted.
    ///
    /// Direct messages are always implicitly addressed to the bot.
    #[must_use]
    pub fn implicit_address(self, is_direct: bool) -> bool {
        is_direct || self == Self::Always
    }
}
