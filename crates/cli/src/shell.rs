//! Console adapter: stdin lines in, replies on stdout.
//!
//! Every line is a direct message from the local operator, so commands need
//! no address (`mtr example.com`).

use std::sync::Arc;

use {
    async_trait::async_trait,
    taskrelay_channels::{ChatEvent, ChatEventSink, ChatOutbound},
    tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

pub const SHELL_USER: &str = "Shell";
pub const SHELL_USER_ID: &str = "1";

/// A line typed by the operator.
pub fn shell_event(text: &str) -> ChatEvent {
    ChatEvent {
        sender_display_name: SHELL_USER.into(),
        sender_id: SHELL_USER_ID.into(),
        room: SHELL_USER.into(),
        text: text.into(),
    }
}

/// Prints replies to stdout.
pub struct ShellOutbound;

#[async_trait]
impl ChatOutbound for ShellOutbound {
    async fn send_text(&self, to: &str, text: &str) -> taskrelay_channels::Result<()> {
        debug!(to, "shell reply");
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{text}\n").as_bytes())
            .await
            .map_err(|e| taskrelay_channels::Error::delivery("shell", "write to stdout", e))?;
        stdout
            .flush()
            .await
            .map_err(|e| taskrelay_channels::Error::delivery("shell", "flush stdout", e))
    }
}

/// Feed non-blank lines from `reader` to `sink` until EOF or cancellation.
pub async fn run_lines<R>(
    reader: R,
    sink: Arc<dyn ChatEventSink>,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {},
                    Some(line) => sink.on_message(shell_event(&line)).await,
                    None => return Ok(()),
                }
            },
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Mutex};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ChatEvent>>,
    }

    #[async_trait]
    impl ChatEventSink for RecordingSink {
        async fn on_message(&self, event: ChatEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn shell_lines_are_direct_messages() {
        let event = shell_event("mtr example.com");
        assert!(event.is_direct());
        assert_eq!(event.sender_id, SHELL_USER_ID);
    }

    #[tokio::test]
    async fn feeds_lines_until_eof() {
        let sink = Arc::new(RecordingSink::default());
        let input: &[u8] = b"mtr example.com\n\n   \nmtr 10.0.0.1\n";
        run_lines(input, Arc::clone(&sink) as _, CancellationToken::new())
            .await
            .unwrap();

        let texts: Vec<String> = sink
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.text.clone())
            .collect();
        assert_eq!(texts, ["mtr example.com", "mtr 10.0.0.1"]);
    }
}
