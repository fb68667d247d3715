//! The task-request document handed to the worker over the bus.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    taskrelay_config::WireFormat,
};

use crate::{
    command::{Command, RequesterContext},
    error::{DispatchError, Result},
};

/// One task request. Built once per dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: String,
    pub target: String,
    pub outputs: Vec<OutputSink>,
}

/// Where and how the worker delivers the task's results.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSink {
    pub channel: String,
    /// The relay's own chat credential, so results post as the same bot.
    #[serde(serialize_with = "serialize_secret")]
    pub bot_key: Secret<String>,
    pub reply_name: String,
    pub reply_room: String,
    pub reply_raw_text: String,
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink")
            .field("channel", &self.channel)
            .field("bot_key", &"[REDACTED]")
            .field("reply_name", &self.reply_name)
            .field("reply_room", &self.reply_room)
            .field("reply_raw_text", &self.reply_raw_text)
            .finish()
    }
}

impl PartialEq for OutputSink {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel
            && self.bot_key.expose_secret() == other.bot_key.expose_secret()
            && self.reply_name == other.reply_name
            && self.reply_room == other.reply_room
            && self.reply_raw_text == other.reply_raw_text
    }
}

impl Eq for OutputSink {}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

const OUTPUT_FIELDS: [&str; 5] = [
    "channel",
    "botKey",
    "replyName",
    "replyRoom",
    "replyRawText",
];

/// Sink keys in the batch framing.
const BATCH_SINK_KEYS: [(&str, &str); 4] = [
    ("channel", "output"),
    ("replyName", "reqName"),
    ("replyRoom", "reqRoom"),
    ("replyRawText", "reqRawText"),
];

fn batch_key(field: &'static str) -> &'static str {
    BATCH_SINK_KEYS
        .iter()
        .find(|(envelope, _)| *envelope == field)
        .map_or(field, |&(_, batch)| batch)
}

/// Rename every output sink's keys, in place, between the two framings.
fn rename_sink_keys(task: &mut Value, to_batch: bool) {
    let Some(outputs) = task.get_mut("outputs").and_then(Value::as_array_mut) else {
        return;
    };
    for sink in outputs.iter_mut().filter_map(Value::as_object_mut) {
        for (envelope, batch) in BATCH_SINK_KEYS {
            let (from, to) = if to_batch {
                (envelope, batch)
            } else {
                (batch, envelope)
            };
            if let Some(value) = sink.remove(from) {
                sink.insert(to.to_string(), value);
            }
        }
    }
}

impl TaskEnvelope {
    /// Check that every mandatory field carries a value.
    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            return Err(DispatchError::malformed("task", "empty"));
        }
        if self.target.trim().is_empty() {
            return Err(DispatchError::malformed("target", "empty"));
        }
        if self.outputs.is_empty() {
            return Err(DispatchError::malformed("outputs", "no output sink"));
        }
        for (i, sink) in self.outputs.iter().enumerate() {
            let values = [
                sink.channel.as_str(),
                sink.bot_key.expose_secret().as_str(),
                sink.reply_name.as_str(),
                sink.reply_room.as_str(),
                sink.reply_raw_text.as_str(),
            ];
            if let Some((field, _)) = OUTPUT_FIELDS
                .iter()
                .zip(values)
                .find(|(_, v)| v.is_empty())
            {
                return Err(DispatchError::malformed(format!("outputs[{i}].{field}"), "empty"));
            }
        }
        Ok(())
    }

    /// Serialize for the bus in the given framing.
    pub fn encode(&self, format: WireFormat) -> Result<String> {
        self.validate()?;
        let mut task = serde_json::to_value(self).map_err(|e| DispatchError::malformed("$", e))?;
        let document = match format {
            WireFormat::Envelope => task,
            WireFormat::Batch => {
                rename_sink_keys(&mut task, true);
                json!({ "message": { "tasks": [task] } })
            },
        };
        serde_json::to_string(&document).map_err(|e| DispatchError::malformed("$", e))
    }
}

/// Parse a published payload in either framing back into an envelope.
pub fn decode(payload: &str) -> Result<TaskEnvelope> {
    let document: Value =
        serde_json::from_str(payload).map_err(|e| DispatchError::malformed("$", e))?;

    let format = if document.get("message").is_some() {
        WireFormat::Batch
    } else {
        WireFormat::Envelope
    };
    let mut task = match format {
        WireFormat::Batch => {
            let tasks = document
                .get("message")
                .and_then(|message| message.get("tasks"))
                .and_then(Value::as_array)
                .ok_or_else(|| DispatchError::malformed("message.tasks", "missing"))?;
            match tasks.as_slice() {
                [only] => only.clone(),
                _ => {
                    return Err(DispatchError::malformed(
                        "message.tasks",
                        format!("expected exactly one task, found {}", tasks.len()),
                    ));
                },
            }
        },
        WireFormat::Envelope => document,
    };

    require_str(&task, "task", "task")?;
    require_str(&task, "target", "target")?;
    let outputs = task
        .get("outputs")
        .and_then(Value::as_array)
        .ok_or_else(|| DispatchError::malformed("outputs", "missing"))?;
    for (i, sink) in outputs.iter().enumerate() {
        for field in OUTPUT_FIELDS {
            let key = match format {
                WireFormat::Envelope => field,
                WireFormat::Batch => batch_key(field),
            };
            require_str(sink, key, &format!("outputs[{i}].{key}"))?;
        }
    }

    if format == WireFormat::Batch {
        rename_sink_keys(&mut task, false);
    }
    let envelope: TaskEnvelope =
        serde_json::from_value(task).map_err(|e| DispatchError::malformed("$", e))?;
    envelope.validate()?;
    Ok(envelope)
}

fn require_str(value: &Value, key: &str, path: &str) -> Result<()> {
    match value.get(key) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(DispatchError::malformed(path, "not a string")),
        None => Err(DispatchError::malformed(path, "missing")),
    }
}

/// Builds envelopes for one relay instance.
#[derive(Clone)]
pub struct EnvelopeBuilder {
    bot_key: Secret<String>,
    sink_channel: String,
}

impl EnvelopeBuilder {
    #[must_use]
    pub fn new(bot_key: Secret<String>, sink_channel: impl Into<String>) -> Self {
        Self {
            bot_key,
            sink_channel: sink_channel.into(),
        }
    }

    /// Exactly one envelope with exactly one output sink.
    ///
    /// `replyRoom` is the resolved reply destination, so results for a direct
    /// message go to the requester's user id.
    #[must_use]
    pub fn build(&self, command: &Command, requester: &RequesterContext) -> TaskEnvelope {
        TaskEnvelope {
            task: command.name.clone(),
            target: command.target.clone(),
            outputs: vec![OutputSink {
                channel: self.sink_channel.clone(),
                bot_key: self.bot_key.clone(),
                reply_name: requester.display_name.clone(),
                reply_room: requester.reply_destination().to_string(),
                reply_raw_text: requester.raw_text.clone(),
            }],
        }
    }
}

impl std::fmt::Debug for EnvelopeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeBuilder")
            .field("bot_key", &"[REDACTED]")
            .field("sink_channel", &self.sink_channel)
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn command() -> Command {
        Command {
            name: "mtr".into(),
            raw_arguments: vec!["relay".into(), "mtr".into(), "example.com".into()],
            target: "example.com".into(),
        }
    }

    fn requester() -> RequesterContext {
        RequesterContext {
            display_name: "alice".into(),
            user_id: "U024BE7LH".into(),
            origin_room: "general".into(),
            raw_text: "relay mtr example.com".into(),
        }
    }

    fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new(Secret::new("xoxb-test".into()), "chat")
    }

    #[test]
    fn builds_one_task_with_one_sink() {
        let envelope = builder().build(&command(), &requester());
        assert_eq!(envelope.task, "mtr");
        assert_eq!(envelope.target, "example.com");
        assert_eq!(envelope.outputs.len(), 1);
        let sink = &envelope.outputs[0];
        assert_eq!(sink.channel, "chat");
        assert_eq!(sink.bot_key.expose_secret(), "xoxb-test");
        assert_eq!(sink.reply_name, "alice");
        assert_eq!(sink.reply_room, "general");
        assert_eq!(sink.reply_raw_text, "relay mtr example.com");
    }

    #[test]
    fn identical_input_builds_identical_envelopes() {
        let b = builder();
        let first = b.build(&command(), &requester());
        let second = b.build(&command(), &requester());
        assert_eq!(first, second);
        assert_eq!(
            first.encode(WireFormat::Envelope).unwrap(),
            second.encode(WireFormat::Envelope).unwrap()
        );
    }

    #[test]
    fn envelope_wire_shape() {
        let payload = builder()
            .build(&command(), &requester())
            .encode(WireFormat::Envelope)
            .unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "task": "mtr",
                "target": "example.com",
                "outputs": [{
                    "channel": "chat",
                    "botKey": "xoxb-test",
                    "replyName": "alice",
                    "replyRoom": "general",
                    "replyRawText": "relay mtr example.com",
                }],
            })
        );
    }

    #[test]
    fn batch_wire_shape_uses_worker_sink_keys() {
        let payload = EnvelopeBuilder::new(Secret::new("xoxb-test".into()), "slack")
            .build(&command(), &requester())
            .encode(WireFormat::Batch)
            .unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "message": {
                    "tasks": [{
                        "task": "mtr",
                        "target": "example.com",
                        "outputs": [{
                            "output": "slack",
                            "botKey": "xoxb-test",
                            "reqName": "alice",
                            "reqRoom": "general",
                            "reqRawText": "relay mtr example.com",
                        }],
                    }],
                },
            })
        );
    }

    #[test]
    fn direct_message_results_go_to_the_user_id() {
        let dm = RequesterContext {
            origin_room: "alice".into(),
            raw_text: "mtr example.com".into(),
            ..requester()
        };
        let envelope = builder().build(&command(), &dm);
        assert_eq!(envelope.outputs[0].reply_room, "U024BE7LH");
        assert_eq!(envelope.outputs[0].reply_name, "alice");
    }

    #[rstest]
    #[case(WireFormat::Envelope)]
    #[case(WireFormat::Batch)]
    fn decodes_what_it_encodes(#[case] format: WireFormat) {
        let envelope = builder().build(&command(), &requester());
        let decoded = decode(&envelope.encode(format).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[rstest]
    #[case("task")]
    #[case("target")]
    #[case("outputs")]
    fn missing_top_level_field_is_malformed(#[case] field: &str) {
        let payload = builder()
            .build(&command(), &requester())
            .encode(WireFormat::Envelope)
            .unwrap();
        let mut value: Value = serde_json::from_str(&payload).unwrap();
        value.as_object_mut().unwrap().remove(field);

        let err = decode(&value.to_string()).unwrap_err();
        assert!(
            matches!(&err, DispatchError::MalformedEnvelope { field: f, .. } if f == field),
            "{err}"
        );
    }

    #[rstest]
    #[case(WireFormat::Envelope, "channel")]
    #[case(WireFormat::Envelope, "botKey")]
    #[case(WireFormat::Envelope, "replyName")]
    #[case(WireFormat::Envelope, "replyRoom")]
    #[case(WireFormat::Envelope, "replyRawText")]
    #[case(WireFormat::Batch, "output")]
    #[case(WireFormat::Batch, "botKey")]
    #[case(WireFormat::Batch, "reqName")]
    #[case(WireFormat::Batch, "reqRoom")]
    #[case(WireFormat::Batch, "reqRawText")]
    fn missing_sink_field_is_malformed(#[case] format: WireFormat, #[case] field: &str) {
        let payload = builder()
            .build(&command(), &requester())
            .encode(format)
            .unwrap();
        let mut value: Value = serde_json::from_str(&payload).unwrap();
        let task = match format {
            WireFormat::Envelope => &mut value,
            WireFormat::Batch => &mut value["message"]["tasks"][0],
        };
        task["outputs"][0].as_object_mut().unwrap().remove(field);

        let err = decode(&value.to_string()).unwrap_err();
        let expected = format!("outputs[0].{field}");
        assert!(
            matches!(&err, DispatchError::MalformedEnvelope { field: f, .. } if *f == expected),
            "{err}"
        );
    }

    #[test]
    fn empty_target_is_not_encoded() {
        let mut envelope = builder().build(&command(), &requester());
        envelope.target.clear();
        assert!(matches!(
            envelope.encode(WireFormat::Envelope),
            Err(DispatchError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn batch_with_several_tasks_is_rejected() {
        let one = serde_json::to_value(builder().build(&command(), &requester())).unwrap();
        let payload = json!({ "message": { "tasks": [one.clone(), one] } }).to_string();
        assert!(matches!(
            decode(&payload),
            Err(DispatchError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn not_json_is_malformed() {
        assert!(matches!(
            decode("mtr example.com"),
            Err(DispatchError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn debug_redacts_bot_key() {
        let envelope = builder().build(&command(), &requester());
        let rendered = format!("{envelope:?} {:?}", builder());
        assert!(!rendered.contains("xoxb-test"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
