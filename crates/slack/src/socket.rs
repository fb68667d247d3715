//! Socket Mode listener.
//!
//! Every envelope Slack pushes is acknowledged by echoing its `envelope_id`
//! right away; message events are then handed to the event sink on their own
//! task so a slow bus or chat call never delays the next ack.

use std::{sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    serde::Deserialize,
    serde_json::{Value, json},
    taskrelay_channels::{ChatEvent, ChatEventSink},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    api::SlackApi,
    error::{Error, Result},
};

/// Maximum reconnect backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A frame received on the Socket Mode WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SocketFrame {
    Hello,
    /// Slack is about to close this connection; open a new one.
    Disconnect { reason: String },
    /// An Events API envelope. `message` is set when it carried a chat
    /// message the relay should look at.
    Event {
        envelope_id: String,
        message: Option<InboundMessage>,
    },
    /// Anything else (slash commands, interactivity). Still acknowledged.
    Other { envelope_id: Option<String> },
}

/// A user-authored message pulled out of an Events API payload.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InboundMessage {
    user: String,
    channel: String,
    is_direct: bool,
    text: String,
}

#[derive(Deserialize)]
struct MessageEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

fn parse_frame(raw: &str, bot_user_id: &str) -> Result<SocketFrame> {
    let frame: Value = serde_json::from_str(raw)?;
    let envelope_id = frame
        .get("envelope_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    match (frame.get("type").and_then(Value::as_str), envelope_id) {
        (Some("hello"), _) => Ok(SocketFrame::Hello),
        (Some("disconnect"), _) => Ok(SocketFrame::Disconnect {
            reason: frame
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string(),
        }),
        (Some("events_api"), Some(envelope_id)) => {
            let message = frame
                .pointer("/payload/event")
                .and_then(|event| message_from_event(event.clone(), bot_user_id));
            Ok(SocketFrame::Event {
                envelope_id,
                message,
            })
        },
        (_, envelope_id) => Ok(SocketFrame::Other { envelope_id }),
    }
}

/// Events of other shapes (`channel_created` carries `channel` as an object)
/// are not messages; the envelope is still acknowledged.
fn message_from_event(event: Value, bot_user_id: &str) -> Option<InboundMessage> {
    let event: MessageEvent = match serde_json::from_value(event) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "skipping non-message event");
            return None;
        },
    };
    if event.kind != "message" || event.subtype.is_some() || event.bot_id.is_some() {
        return None;
    }
    let (Some(user), Some(channel), Some(text)) = (event.user, event.channel, event.text) else {
        return None;
    };
    if user == bot_user_id {
        return None;
    }
    Some(InboundMessage {
        user,
        channel,
        is_direct: event.channel_type.as_deref() == Some("im"),
        text,
    })
}

/// Chat event for `message`, with the sender resolved to `display_name`.
///
/// A direct message reports the sender's name as its room, which is how the
/// relay recognizes it and routes replies to the user ID instead.
fn to_chat_event(message: InboundMessage, display_name: String) -> ChatEvent {
    let room = if message.is_direct {
        display_name.clone()
    } else {
        message.channel
    };
    ChatEvent {
        sender_display_name: display_name,
        sender_id: message.user,
        room,
        text: message.text,
    }
}

enum SessionEnd {
    Reconnect,
    Cancelled,
}

/// Receives messages over Socket Mode and feeds them to an event sink.
pub struct SocketModeListener {
    api: Arc<SlackApi>,
    bot_user_id: String,
    sink: Arc<dyn ChatEventSink>,
}

impl SocketModeListener {
    #[must_use]
    pub fn new(api: Arc<SlackApi>, bot_user_id: String, sink: Arc<dyn ChatEventSink>) -> Self {
        // wss:// needs a process-level rustls provider.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            api,
            bot_user_id,
            sink,
        }
    }

    /// Listen until `cancel` fires or the credentials turn out to be unusable.
    ///
    /// Connection failures are retried with exponential backoff; a
    /// `disconnect` frame reconnects immediately.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut backoff = Duration::from_secs(1);
        loop {
            match self.connect_and_run(&cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    info!("slack socket mode stopped");
                    return Ok(());
                },
                Ok(SessionEnd::Reconnect) => {
                    backoff = Duration::from_secs(1);
                    continue;
                },
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "slack socket mode cannot connect");
                    return Err(e);
                },
                Err(e) => {
                    warn!(error = %e, delay_ms = backoff.as_millis(), "slack socket mode error, reconnecting after delay");
                },
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {},
                _ = cancel.cancelled() => return Ok(()),
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_and_run(&self, cancel: &CancellationToken) -> Result<SessionEnd> {
        let url = self.api.open_socket_url().await?;
        let (ws_stream, _response) = connect_async(url.as_str()).await?;
        let (mut ws_sink, mut ws_reader) = ws_stream.split();
        debug!("slack socket mode websocket open");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                },
                msg = ws_reader.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame = match parse_frame(text.as_str(), &self.bot_user_id) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    warn!(error = %e, "ignoring unparseable socket mode frame");
                                    continue;
                                },
                            };
                            match frame {
                                SocketFrame::Hello => info!("slack socket mode connected"),
                                SocketFrame::Disconnect { reason } => {
                                    info!(reason = %reason, "slack requested reconnect");
                                    return Ok(SessionEnd::Reconnect);
                                },
                                SocketFrame::Event { envelope_id, message } => {
                                    ws_sink.send(ack(&envelope_id)).await?;
                                    if let Some(message) = message {
                                        self.deliver(message);
                                    }
                                },
                                SocketFrame::Other { envelope_id } => {
                                    if let Some(envelope_id) = envelope_id {
                                        ws_sink.send(ack(&envelope_id)).await?;
                                    }
                                },
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            ws_sink.send(Message::Pong(data)).await?;
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("slack socket mode websocket closed");
                            return Ok(SessionEnd::Reconnect);
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => return Err(Error::from(e)),
                    }
                },
            }
        }
    }

    fn deliver(&self, message: InboundMessage) {
        let api = Arc::clone(&self.api);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let display_name = match api.display_name(&message.user).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(user_id = %message.user, error = %e, "could not resolve slack user name");
                    message.user.clone()
                },
            };
            sink.on_message(to_chat_event(message, display_name)).await;
        });
    }
}

fn ack(envelope_id: &str) -> Message {
    Message::Text(json!({ "envelope_id": envelope_id }).to_string().into())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        axum::{
            Json, Router,
            extract::{
                State,
                ws::{self, WebSocket, WebSocketUpgrade},
            },
            response::Response,
            routing::{any, get, post},
        },
        secrecy::Secret,
        std::sync::Mutex,
        tokio::sync::mpsc,
    };

    fn events_api(event: Value) -> String {
        json!({
            "type": "events_api",
            "envelope_id": "57d6a792-4d35-4d0b-b6aa-3361493e1caf",
            "accepts_response_payload": false,
            "payload": { "type": "event_callback", "event": event },
        })
        .to_string()
    }

    #[test]
    fn hello_and_disconnect() {
        assert_eq!(
            parse_frame(r#"{"type":"hello","num_connections":1}"#, "U0BOT").unwrap(),
            SocketFrame::Hello
        );
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#, "U0BOT")
                .unwrap(),
            SocketFrame::Disconnect {
                reason: "refresh_requested".into()
            }
        );
    }

    #[test]
    fn channel_message_is_extracted() {
        let raw = events_api(json!({
            "type": "message",
            "user": "U024BE7LH",
            "channel": "C024BE91L",
            "channel_type": "channel",
            "text": "<@U0BOT> mtr example.com",
            "ts": "1355517523.000005",
        }));
        let SocketFrame::Event {
            envelope_id,
            message,
        } = parse_frame(&raw, "U0BOT").unwrap()
        else {
            panic!("expected an events_api frame");
        };
        assert_eq!(envelope_id, "57d6a792-4d35-4d0b-b6aa-3361493e1caf");
        assert_eq!(
            message,
            Some(InboundMessage {
                user: "U024BE7LH".into(),
                channel: "C024BE91L".into(),
                is_direct: false,
                text: "<@U0BOT> mtr example.com".into(),
            })
        );
    }

    #[rstest::rstest]
    #[case(json!({"type": "message", "subtype": "message_changed", "channel": "C1", "hidden": true}))]
    #[case(json!({"type": "message", "bot_id": "B1", "user": "U9", "channel": "C1", "text": "hi"}))]
    #[case(json!({"type": "message", "user": "U0BOT", "channel": "C1", "text": "mtr x"}))]
    #[case(json!({"type": "app_mention", "user": "U1", "channel": "C1", "text": "<@U0BOT> mtr x"}))]
    #[case(json!({"type": "reaction_added", "user": "U1", "reaction": "thumbsup"}))]
    #[case(json!({"type": "channel_created", "channel": {"id": "C9", "name": "ops", "creator": "U1"}}))]
    fn non_user_messages_are_acked_but_skipped(#[case] event: Value) {
        let frame = parse_frame(&events_api(event), "U0BOT").unwrap();
        assert!(matches!(frame, SocketFrame::Event { message: None, .. }));
    }

    #[test]
    fn event_with_object_channel_still_carries_its_envelope_id() {
        let raw = events_api(json!({
            "type": "channel_created",
            "channel": { "id": "C9", "name": "ops", "created": 1360782804, "creator": "U1" },
        }));
        assert_eq!(parse_frame(&raw, "U0BOT").unwrap(), SocketFrame::Event {
            envelope_id: "57d6a792-4d35-4d0b-b6aa-3361493e1caf".into(),
            message: None,
        });
    }

    #[test]
    fn slash_commands_are_acked_as_other() {
        let frame = parse_frame(
            r#"{"type":"slash_commands","envelope_id":"abc","payload":{}}"#,
            "U0BOT",
        )
        .unwrap();
        assert_eq!(frame, SocketFrame::Other {
            envelope_id: Some("abc".into())
        });
    }

    #[test]
    fn direct_message_reports_sender_as_room() {
        let event = to_chat_event(
            InboundMessage {
                user: "U024BE7LH".into(),
                channel: "D024BE91L".into(),
                is_direct: true,
                text: "mtr example.com".into(),
            },
            "alice".into(),
        );
        assert!(event.is_direct());
        assert_eq!(event.room, "alice");
        assert_eq!(event.sender_id, "U024BE7LH");

        let event = to_chat_event(
            InboundMessage {
                user: "U024BE7LH".into(),
                channel: "C024BE91L".into(),
                is_direct: false,
                text: "relay mtr example.com".into(),
            },
            "alice".into(),
        );
        assert!(!event.is_direct());
        assert_eq!(event.room, "C024BE91L");
    }

    // End-to-end against an in-process Socket Mode server.

    #[derive(Clone)]
    struct MockSocketMode {
        ws_url: Arc<Mutex<String>>,
        acks: mpsc::UnboundedSender<String>,
    }

    async fn connections_open(State(mock): State<MockSocketMode>) -> Json<Value> {
        let url = mock.ws_url.lock().unwrap().clone();
        Json(json!({ "ok": true, "url": url }))
    }

    async fn users_info() -> Json<Value> {
        Json(json!({
            "ok": true,
            "user": { "id": "U024BE7LH", "name": "alice", "profile": { "display_name": "alice" } }
        }))
    }

    async fn socket(ws: WebSocketUpgrade, State(mock): State<MockSocketMode>) -> Response {
        ws.on_upgrade(move |socket| drive_socket(socket, mock))
    }

    async fn drive_socket(mut socket: WebSocket, mock: MockSocketMode) {
        let hello = json!({ "type": "hello" }).to_string();
        let event = events_api(json!({
            "type": "message",
            "user": "U024BE7LH",
            "channel": "D024BE91L",
            "channel_type": "im",
            "text": "mtr example.com",
        }));
        for frame in [hello, event] {
            if socket.send(ws::Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(msg)) = socket.recv().await {
            if let ws::Message::Text(text) = msg {
                let _ = mock.acks.send(text.as_str().to_string());
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ChatEvent>>,
        notify: tokio::sync::Notify,
    }

    #[async_trait]
    impl ChatEventSink for RecordingSink {
        async fn on_message(&self, event: ChatEvent) {
            self.events.lock().unwrap().push(event);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn acks_envelopes_and_delivers_direct_messages() {
        let (acks_tx, mut acks_rx) = mpsc::unbounded_channel();
        let mock = MockSocketMode {
            ws_url: Arc::new(Mutex::new(String::new())),
            acks: acks_tx,
        };
        let app = Router::new()
            .route("/api/apps.connections.open", post(connections_open))
            .route("/api/users.info", get(users_info))
            .route("/link", any(socket))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        *mock.ws_url.lock().unwrap() = format!("ws://{addr}/link");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock slack");
        });

        let api = Arc::new(
            SlackApi::new(
                &format!("http://{addr}/api"),
                Secret::new("xoxb-test".into()),
                Some(Secret::new("xapp-test".into())),
            )
            .unwrap(),
        );
        let sink = Arc::new(RecordingSink::default());
        let listener = SocketModeListener::new(api, "U0BOT".into(), Arc::clone(&sink) as _);
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { listener.run(cancel).await }
        });

        let ack = tokio::time::timeout(Duration::from_secs(5), acks_rx.recv())
            .await
            .expect("ack in time")
            .expect("ack frame");
        let ack: Value = serde_json::from_str(&ack).unwrap();
        assert_eq!(ack["envelope_id"], "57d6a792-4d35-4d0b-b6aa-3361493e1caf");

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.events.lock().unwrap().is_empty() {
                sink.notify.notified().await;
            }
        })
        .await
        .expect("event delivered in time");

        let event = sink.events.lock().unwrap()[0].clone();
        assert_eq!(event, ChatEvent {
            sender_display_name: "alice".into(),
            sender_id: "U024BE7LH".into(),
            room: "alice".into(),
            text: "mtr example.com".into(),
        });

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("listener stops")
            .unwrap();
        assert!(result.is_ok());
    }
}
