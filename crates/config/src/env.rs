//! `TASKRELAY_*` environment overrides, applied after the config file.

use secrecy::Secret;

use crate::{
    error::{Error, Result},
    schema::{BUS_CHANNEL, BUS_HOST, BUS_PASSWORD, BUS_PORT, CHAT_TOKEN, RelayConfig},
};

pub const SLACK_APP_TOKEN: &str = "TASKRELAY_SLACK_APP_TOKEN";
pub const BOT_NAME: &str = "TASKRELAY_BOT_NAME";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut RelayConfig) -> Result<()> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply overrides from a custom lookup. Empty values are ignored so that an
/// exported-but-blank variable never hides a value from the file.
pub fn apply_env_overrides_with(
    config: &mut RelayConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get(CHAT_TOKEN) {
        config.chat.token = Some(Secret::new(token));
    }
    if let Some(host) = get(BUS_HOST) {
        config.bus.host = Some(host);
    }
    if let Some(port) = get(BUS_PORT) {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| Error::invalid(BUS_PORT, format!("{port:?} is not a TCP port: {e}")))?;
        config.bus.port = Some(port);
    }
    if let Some(password) = get(BUS_PASSWORD) {
        config.bus.password = Some(Secret::new(password));
    }
    if let Some(channel) = get(BUS_CHANNEL) {
        config.bus.channel = Some(channel);
    }
    if let Some(app_token) = get(SLACK_APP_TOKEN) {
        config.chat.slack.app_token = Some(Secret::new(app_token));
    }
    if let Some(bot_name) = get(BOT_NAME) {
        config.chat.bot_name = bot_name;
    }
    Ok(())
}
