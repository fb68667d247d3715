//! Per-message orchestration: parse, acknowledge, publish.

use std::sync::Arc;

use {
    async_trait::async_trait,
    taskrelay_bus::TaskPublisher,
    taskrelay_channels::{ChatEvent, ChatEventSink, ChatOutbound},
    taskrelay_config::{ResolvedConfig, WireFormat},
    tracing::{debug, info, warn},
};

use crate::{
    command::{Command, CommandParser, RequesterContext},
    envelope::EnvelopeBuilder,
    error::Result,
};

/// What happened to one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a command for this relay.
    Ignored,
    /// The envelope was handed to the bus.
    Dispatched { task: String, receivers: u64 },
    /// The command matched but its task never reached the bus.
    Dropped { task: String, reason: String },
}

/// Turns matching chat commands into published task envelopes.
pub struct DispatchHandler {
    parser: CommandParser,
    builder: EnvelopeBuilder,
    publisher: Arc<dyn TaskPublisher>,
    outbound: Arc<dyn ChatOutbound>,
    channel: String,
    wire_format: WireFormat,
    acknowledgement: String,
    notify_on_failure: bool,
}

impl DispatchHandler {
    /// Wire a handler from resolved configuration. `bot_id` is the chat
    /// platform's ID for the bot, when it has mention tokens.
    pub fn from_config(
        config: &ResolvedConfig,
        bot_id: Option<&str>,
        publisher: Arc<dyn TaskPublisher>,
        outbound: Arc<dyn ChatOutbound>,
    ) -> Result<Self> {
        let parser = CommandParser::new(
            &config.relay.commands,
            &config.chat.bot_name,
            bot_id,
            config.chat.mention_mode,
        )?;
        Ok(Self {
            parser,
            builder: EnvelopeBuilder::new(
                config.chat_token.clone(),
                config.relay.sink_channel.clone(),
            ),
            publisher,
            outbound,
            channel: config.bus_channel.clone(),
            wire_format: config.bus.wire_format,
            acknowledgement: config.relay.acknowledgement.clone(),
            notify_on_failure: config.relay.notify_on_failure,
        })
    }

    /// Handle one chat message.
    ///
    /// The acknowledgement and the publish run concurrently, so the
    /// requester hears back whatever the bus does. Failures end here: they
    /// are logged and reported in the outcome, never propagated.
    pub async fn dispatch(&self, event: &ChatEvent) -> DispatchOutcome {
        let Some((command, requester)) = self.parser.parse(event) else {
            debug!(room = %event.room, "message is not a task command");
            return DispatchOutcome::Ignored;
        };

        info!(
            requester_id = %requester.user_id,
            requester_name = %requester.display_name,
            origin = %requester.origin_label(),
            raw_text = %requester.raw_text,
            task = %command.name,
            target = %command.target,
            "task command received"
        );

        let destination = requester.reply_destination();
        let ack = self.acknowledgement.replace("{task}", &command.name);
        let (ack_result, publish_result) = tokio::join!(
            self.outbound.send_text(destination, &ack),
            self.publish(&command, &requester),
        );

        let reply_unreachable = match ack_result {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    destination,
                    permanent = e.is_permanent(),
                    error = %e,
                    "failed to acknowledge task command"
                );
                e.is_permanent()
            },
        };

        match publish_result {
            Ok(receivers) => {
                info!(task = %command.name, channel = %self.channel, receivers, "task dispatched");
                DispatchOutcome::Dispatched {
                    task: command.name,
                    receivers,
                }
            },
            Err(e) => {
                warn!(
                    task = %command.name,
                    target = %command.target,
                    requester_id = %requester.user_id,
                    error = %e,
                    "task dropped"
                );
                if self.notify_on_failure && !reply_unreachable {
                    let notice = format!(
                        "Sorry, the requested {} could not be started: {e}",
                        command.name
                    );
                    if let Err(send_err) = self.outbound.send_text(destination, &notice).await {
                        warn!(destination, error = %send_err, "failed to send failure notice");
                    }
                }
                DispatchOutcome::Dropped {
                    task: command.name,
                    reason: e.to_string(),
                }
            },
        }
    }

    async fn publish(&self, command: &Command, requester: &RequesterContext) -> Result<u64> {
        let payload = self
            .builder
            .build(command, requester)
            .encode(self.wire_format)?;
        let receipt = self.publisher.publish(&self.channel, &payload).await?;
        Ok(receipt.receivers)
    }
}

#[async_trait]
impl ChatEventSink for DispatchHandler {
    async fn on_message(&self, event: ChatEvent) {
        self.dispatch(&event).await;
    }
}
