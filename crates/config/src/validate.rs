//! Startup validation.
//!
//! [`ensure_startup`] is the gate the binary runs before accepting any chat
//! command: every required parameter must be present and non-blank, or the
//! process refuses to start. [`validate`] produces the full diagnostic report
//! shown by `taskrelay check`.

use std::time::Duration;

use {secrecy::Secret, tracing::debug};

use crate::{
    error::{Error, Result},
    schema::{BUS_PORT, BusConfig, ChatConfig, DispatchConfig, RelayConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Parameter or dotted config path, e.g. `bus.publish_timeout_secs`.
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Check that every named parameter is present and non-blank.
///
/// Parameters are checked in iteration order and the first missing one is
/// reported, so the outcome only depends on which parameters are absent,
/// never on timing or map ordering.
pub fn require_parameters<'a, I, V>(params: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, Option<V>)>,
    V: AsRef<str>,
{
    for (name, value) in params {
        match value {
            Some(v) if !v.as_ref().trim().is_empty() => {},
            _ => return Err(Error::missing(name)),
        }
    }
    Ok(())
}

/// Configuration with every required parameter proven present.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub chat_token: Secret<String>,
    pub bus_host: String,
    pub bus_port: u16,
    pub bus_password: Secret<String>,
    pub bus_channel: String,
    pub chat: ChatConfig,
    pub bus: BusConfig,
    pub relay: DispatchConfig,
}

impl ResolvedConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.bus.connect_timeout_secs)
    }

    /// `None` when the bound is disabled.
    #[must_use]
    pub fn publish_timeout(&self) -> Option<Duration> {
        (self.bus.publish_timeout_secs > 0)
            .then(|| Duration::from_secs(self.bus.publish_timeout_secs))
    }

    /// `None` when keepalive pings are disabled.
    #[must_use]
    pub fn keepalive(&self) -> Option<Duration> {
        (self.bus.keepalive_secs > 0).then(|| Duration::from_secs(self.bus.keepalive_secs))
    }
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("chat_token", &"[REDACTED]")
            .field("bus_host", &self.bus_host)
            .field("bus_port", &self.bus_port)
            .field("bus_password", &"[REDACTED]")
            .field("bus_channel", &self.bus_channel)
            .field("chat", &self.chat)
            .field("bus", &self.bus)
            .field("relay", &self.relay)
            .finish()
    }
}

/// Verify the required parameters and resolve them into a [`ResolvedConfig`].
///
/// Fails with [`Error::MissingConfiguration`] naming the first absent
/// parameter; the relay must not start in that case.
pub fn ensure_startup(config: &RelayConfig) -> Result<ResolvedConfig> {
    let params = config.required_parameters();
    require_parameters(params.iter().map(|(name, value)| (*name, value.as_deref())))?;

    let (Some(chat_token), Some(bus_host), Some(bus_port), Some(bus_password), Some(bus_channel)) = (
        config.chat.token.clone(),
        config.bus.host.clone(),
        config.bus.port,
        config.bus.password.clone(),
        config.bus.channel.clone(),
    ) else {
        return Err(Error::Message {
            message: "required parameters changed during validation".into(),
        });
    };

    if bus_port == 0 {
        return Err(Error::invalid(BUS_PORT, "port 0 cannot be connected to"));
    }
    if config.relay.commands.is_empty() {
        return Err(Error::invalid(
            "relay.commands",
            "at least one command keyword is required",
        ));
    }
    if let Some(cmd) = config
        .relay
        .commands
        .iter()
        .find(|c| c.keyword.trim().is_empty() || c.keyword.contains(char::is_whitespace))
    {
        return Err(Error::invalid(
            "relay.commands",
            format!("keyword {:?} must be a single non-empty word", cmd.keyword),
        ));
    }

    debug!(
        bus_host = %bus_host,
        bus_port,
        bus_channel = %bus_channel,
        commands = config.relay.commands.len(),
        "configuration resolved"
    );

    Ok(ResolvedConfig {
        chat_token,
        bus_host: bus_host.trim().to_string(),
        bus_port,
        bus_password,
        bus_channel: bus_channel.trim().to_string(),
        chat: config.chat.clone(),
        bus: config.bus.clone(),
        relay: config.relay.clone(),
    })
}

/// Full diagnostic report: startup errors plus advisory warnings.
#[must_use]
pub fn validate(config: &RelayConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (name, value) in config.required_parameters() {
        if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
            result.push(Severity::Error, name, "required parameter is not set");
        }
    }
    if config.bus.port == Some(0) {
        result.push(Severity::Error, BUS_PORT, "port 0 cannot be connected to");
    }

    if config.relay.commands.is_empty() {
        result.push(
            Severity::Error,
            "relay.commands",
            "no command keywords configured; nothing would be dispatched",
        );
    }
    let mut seen = std::collections::HashSet::new();
    for cmd in &config.relay.commands {
        if cmd.keyword.trim().is_empty() || cmd.keyword.contains(char::is_whitespace) {
            result.push(
                Severity::Error,
                "relay.commands",
                format!("keyword {:?} must be a single non-empty word", cmd.keyword),
            );
        } else if !seen.insert(cmd.keyword.to_lowercase()) {
            result.push(
                Severity::Warning,
                "relay.commands",
                format!(
                    "keyword {:?} is bound twice; only the first binding is used",
                    cmd.keyword
                ),
            );
        }
    }

    if config.bus.publish_timeout_secs == 0 {
        result.push(
            Severity::Warning,
            "bus.publish_timeout_secs",
            "publish timeout disabled; a wedged bus connection can stall dispatches",
        );
    }
    if config.bus.connect_timeout_secs == 0 {
        result.push(
            Severity::Warning,
            "bus.connect_timeout_secs",
            "connect timeout of 0 makes every connection attempt fail immediately",
        );
    }
    if config.relay.notify_on_failure {
        result.push(
            Severity::Info,
            "relay.notify_on_failure",
            "requesters are told when a task could not be published",
        );
    }
    if !config.relay.acknowledgement.contains("{task}") {
        result.push(
            Severity::Info,
            "relay.acknowledgement",
            "acknowledgement does not mention the task name",
        );
    }

    result
}
