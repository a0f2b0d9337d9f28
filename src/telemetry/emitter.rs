//! Bounded, non-blocking telemetry queue.

use crate::telemetry::{TelemetrySink, UsageEvent};
use crate::KeygateError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

enum Message {
    Event(UsageEvent),
    Flush(oneshot::Sender<()>),
}

/// Queue of usage events drained by a writer task into a sink.
///
/// Cloning shares the queue.
#[derive(Clone)]
pub struct TelemetryEmitter {
    tx: mpsc::Sender<Message>,
}

impl TelemetryEmitter {
    /// Start the writer task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn TelemetrySink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(drain(rx, sink));
        Self { tx }
    }

    /// Queue an event. Never waits: a full queue drops the event.
    pub fn emit(&self, event: UsageEvent) {
        if let Err(e) = self.tx.try_send(Message::Event(event)) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            warn!(reason, "dropped usage event");
        }
    }

    /// Wait until every event queued before this call reached the sink.
    pub async fn flush(&self) -> Result<(), KeygateError> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(Message::Flush(done))
            .await
            .map_err(|_| {
                KeygateError::TelemetryUnavailable("telemetry writer stopped".to_string())
            })?;
        wait.await
            .map_err(|_| KeygateError::TelemetryUnavailable("telemetry writer stopped".to_string()))
    }
}

async fn drain(mut rx: mpsc::Receiver<Message>, sink: Arc<dyn TelemetrySink>) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Event(event) => {
                if let Err(e) = sink.record(event).await {
                    warn!(error = %e, "telemetry sink failed");
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
