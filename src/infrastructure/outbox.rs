use crate::domain::directory::ChatAddress;
use crate::domain::notification::ActionToken;
use crate::domain::ports::NotificationTransport;
use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use tokio::sync::Mutex;

#[derive(Serialize)]
struct OutboxEntry<'a> {
    recipient: &'a str,
    action: ActionToken,
    text: &'a str,
}

/// Transport that appends each message as one JSON line to a writer.
///
/// A chat gateway (or a human) picks the lines up from there; the engine
/// only needs to know whether the line was written.
pub struct OutboxTransport<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> OutboxTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> NotificationTransport for OutboxTransport<W> {
    async fn send_message(
        &self,
        recipient: &ChatAddress,
        text: &str,
        action: &ActionToken,
    ) -> Result<(), DeliveryError> {
        let entry = OutboxEntry {
            recipient: recipient.as_str(),
            action: *action,
            text,
        };
        let line =
            serde_json::to_string(&entry).map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::PaymentId;

    #[tokio::test]
    async fn test_outbox_writes_json_lines() {
        let outbox = OutboxTransport::new(Vec::new());
        let to = ChatAddress::new("777").unwrap();
        outbox
            .send_message(&to, "first", &ActionToken::ConfirmPayment(PaymentId(1)))
            .await
            .unwrap();
        outbox
            .send_message(&to, "second\nline", &ActionToken::ConfirmPayment(PaymentId(2)))
            .await
            .unwrap();

        let written = String::from_utf8(outbox.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["recipient"], "777");
        assert_eq!(lines[0]["action"], "payment_1");
        assert_eq!(lines[1]["text"], "second\nline");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_outbox_write_failure_is_delivery_error() {
        let outbox = OutboxTransport::new(BrokenPipe);
        let result = outbox
            .send_message(
                &ChatAddress::new("1").unwrap(),
                "hi",
                &ActionToken::ConfirmPayment(PaymentId(1)),
            )
            .await;
        assert!(matches!(result, Err(DeliveryError::Transport(_))));
    }
}
