//! Recognizing task commands in chat text.
//!
//! A command has the shape `<address> <keyword> <argument...>`. In rooms the
//! address is required (the bot's name, `@name`, `name:`/`name,` or a
//! platform mention token such as `<@U0BOT>`); in direct messages it may be
//! omitted and the bot's name is implied. Either way the matched text is
//! tokenized on whitespace and token 2 is the target.

use {
    regex::{Regex, RegexBuilder},
    taskrelay_channels::{ChatEvent, gating::MentionMode},
    taskrelay_config::CommandConfig,
};

use crate::error::Result;

/// Origin label used in audit logs for direct messages.
pub const DIRECT_MESSAGE_ORIGIN: &str = "PRIVATE_DIRECT_MESSAGE";

/// A recognized command. Created per chat event, discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Task identifier the command maps to.
    pub name: String,
    /// Whitespace tokens of the matched text, address and keyword included.
    pub raw_arguments: Vec<String>,
    /// Token 2 of the matched text, passed through untouched.
    pub target: String,
}

/// Who asked, and where the answer goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterContext {
    pub display_name: String,
    pub user_id: String,
    pub origin_room: String,
    pub raw_text: String,
}

impl RequesterContext {
    #[must_use]
    pub fn from_event(event: &ChatEvent) -> Self {
        Self {
            display_name: event.sender_display_name.clone(),
            user_id: event.sender_id.clone(),
            origin_room: event.room.clone(),
            raw_text: event.text.clone(),
        }
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.display_name == self.origin_room
    }

    /// Destination for replies: the user for a direct message, else the room.
    #[must_use]
    pub fn reply_destination(&self) -> &str {
        if self.is_direct() {
            &self.user_id
        } else {
            &self.origin_room
        }
    }

    /// Origin as written to the audit log.
    #[must_use]
    pub fn origin_label(&self) -> &str {
        if self.is_direct() {
            DIRECT_MESSAGE_ORIGIN
        } else {
            &self.origin_room
        }
    }
}

/// One keyword bound to one task.
#[derive(Debug, Clone)]
pub struct CommandPattern {
    task: String,
    addressed: Regex,
    bare: Regex,
}

impl CommandPattern {
    /// Build the pattern for `keyword`, answering to `bot_name` and, when the
    /// platform has one, the mention token of `bot_id`.
    pub fn new(keyword: &str, task: &str, bot_name: &str, bot_id: Option<&str>) -> Result<Self> {
        let keyword = regex::escape(keyword);
        let name = regex::escape(bot_name.trim());
        let address = match bot_id {
            Some(id) => format!(r"(?:<@{}>|@?{name}[:,]?)", regex::escape(id)),
            None => format!(r"@?{name}[:,]?"),
        };

        let addressed = RegexBuilder::new(&format!(r"^\s*{address}\s+{keyword}\s+\S.*"))
            .case_insensitive(true)
            .build()?;
        let bare = RegexBuilder::new(&format!(r"^\s*{keyword}\s+\S.*"))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            task: task.to_string(),
            addressed,
            bare,
        })
    }

    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Match `text`, returning the normalized matched text.
    ///
    /// With `implicit_address`, an unaddressed command is accepted and
    /// `bot_name` is prefixed so token positions stay the same.
    fn matched_text(&self, text: &str, bot_name: &str, implicit_address: bool) -> Option<String> {
        if let Some(m) = self.addressed.find(text) {
            return Some(m.as_str().trim().to_string());
        }
        if implicit_address && let Some(m) = self.bare.find(text) {
            return Some(format!("{} {}", bot_name.trim(), m.as_str().trim()));
        }
        None
    }

    /// Parse `text` into a [`Command`], or `None` if it is not this command.
    #[must_use]
    pub fn parse(&self, text: &str, bot_name: &str, implicit_address: bool) -> Option<Command> {
        let matched = self.matched_text(text, bot_name, implicit_address)?;
        let raw_arguments: Vec<String> = matched.split_whitespace().map(str::to_string).collect();
        let target = raw_arguments.get(2)?.clone();
        Some(Command {
            name: self.task.clone(),
            raw_arguments,
            target,
        })
    }
}

/// Matches chat events against the configured command keywords.
#[derive(Debug, Clone)]
pub struct CommandParser {
    bot_name: String,
    mention_mode: MentionMode,
    patterns: Vec<CommandPattern>,
}

impl CommandParser {
    pub fn new(
        commands: &[CommandConfig],
        bot_name: &str,
        bot_id: Option<&str>,
        mention_mode: MentionMode,
    ) -> Result<Self> {
        let patterns = commands
            .iter()
            .map(|c| CommandPattern::new(&c.keyword, &c.task_name(), bot_name, bot_id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            bot_name: bot_name.trim().to_string(),
            mention_mode,
            patterns,
        })
    }

    /// The first configured command matching `event`, with its requester.
    ///
    /// `None` means "not for us"; it is never an error.
    #[must_use]
    pub fn parse(&self, event: &ChatEvent) -> Option<(Command, RequesterContext)> {
        let requester = RequesterContext::from_event(event);
        let is_direct = requester.is_direct();
        if !self.mention_mode.listens(is_direct) {
            return None;
        }
        let implicit = self.mention_mode.implicit_address(is_direct);
        let command = self
            .patterns
            .iter()
            .find_map(|p| p.parse(&event.text, &self.bot_name, implicit))?;
        Some((command, requester))
    }
}
