//! Config schema types (chat, bus, dispatch).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    taskrelay_channels::gating::MentionMode,
};

/// Environment-style names of the five parameters the relay cannot start
/// without, in the order they are checked.
pub const CHAT_TOKEN: &str = "TASKRELAY_CHAT_TOKEN";
pub const BUS_HOST: &str = "TASKRELAY_BUS_HOST";
pub const BUS_PORT: &str = "TASKRELAY_BUS_PORT";
pub const BUS_PASSWORD: &str = "TASKRELAY_BUS_PASSWORD";
pub const BUS_CHANNEL: &str = "TASKRELAY_BUS_CHANNEL";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub chat: ChatConfig,
    pub bus: BusConfig,
    pub relay: DispatchConfig,
}

impl RelayConfig {
    /// The required parameters as a `name → value` mapping, in check order.
    ///
    /// Values are rendered as plain strings so the validator can treat them
    /// uniformly.
    pub fn required_parameters(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            (
                CHAT_TOKEN,
                self.chat
                    .token
                    .as_ref()
                    .map(|s| s.expose_secret().to_string()),
            ),
            (BUS_HOST, self.bus.host.clone()),
            (BUS_PORT, self.bus.port.map(|p| p.to_string())),
            (
                BUS_PASSWORD,
                self.bus
                    .password
                    .as_ref()
                    .map(|s| s.expose_secret().to_string()),
            ),
            (BUS_CHANNEL, self.bus.channel.clone()),
        ]
    }
}

/// Chat platform configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Bot token used to talk to the chat platform. Also handed to the
    /// downstream worker as the output sink's `botKey`.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,

    /// Name the bot answers to when addressed in a room.
    pub bot_name: String,

    /// Whether room messages must address the bot.
    pub mention_mode: MentionMode,

    pub slack: SlackConfig,
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("bot_name", &self.bot_name)
            .field("mention_mode", &self.mention_mode)
            .field("slack", &self.slack)
            .finish()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token: None,
            bot_name: "relay".into(),
            mention_mode: MentionMode::Mention,
            slack: SlackConfig::default(),
        }
    }
}

/// Slack Socket Mode settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// App-level token (`xapp-...`) used to open Socket Mode connections.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_token: Option<Secret<String>>,

    /// Web API base URL.
    pub api_base: String,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("app_token", &self.app_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            app_token: None,
            api_base: "https://slack.com/api".into(),
        }
    }
}

/// Pub/sub bus connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<Secret<String>>,
    /// Channel task requests are published on.
    pub channel: Option<String>,
    pub connect_timeout_secs: u64,
    /// Upper bound on a single publish. `0` disables the bound.
    pub publish_timeout_secs: u64,
    /// Interval between liveness pings on an idle link. `0` disables them.
    pub keepalive_secs: u64,
    pub wire_format: WireFormat,
}

impl std::fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("channel", &self.channel)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("publish_timeout_secs", &self.publish_timeout_secs)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("wire_format", &self.wire_format)
            .finish()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            password: None,
            channel: None,
            connect_timeout_secs: 5,
            publish_timeout_secs: 5,
            keepalive_secs: 30,
            wire_format: WireFormat::Envelope,
        }
    }
}

/// Framing of the payload published to the bus.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// The bare task envelope document.
    #[default]
    Envelope,
    /// `{"message":{"tasks":[envelope]}}` with the `output`, `reqName`,
    /// `reqRoom` and `reqRawText` sink keys older workers read.
    Batch,
}

/// Which chat commands turn into tasks, and how the requester is answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub commands: Vec<CommandConfig>,
    /// Acknowledgement sent to the requester. `{task}` is replaced with the
    /// task name.
    pub acknowledgement: String,
    /// Value of the output sink's `channel` field.
    pub sink_channel: String,
    /// Tell the requester when a task could not be handed to the bus.
    pub notify_on_failure: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            commands: vec![CommandConfig {
                keyword: "mtr".into(),
                task: None,
            }],
            acknowledgement: "Just a moment please as I perform the requested {task} for you..."
                .into(),
            sink_channel: "chat".into(),
            notify_on_failure: false,
        }
    }
}

/// One chat keyword bound to one task type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    pub keyword: String,
    /// Task identifier placed in the envelope. Defaults to the lowercased
    /// keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl CommandConfig {
    #[must_use]
    pub fn task_name(&self) -> String {
        self.task
            .clone()
            .unwrap_or_else(|| self.keyword.to_lowercase())
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
