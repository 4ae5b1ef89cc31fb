//! Pull-based event subscriptions.

use super::manager::Shared;
use super::types::{EventData, EventHandler, EventKind, HandlerError, HandlerId};
use async_trait::async_trait;
use std::sync::Weak;
use tokio::sync::mpsc;

/// Buffered events per stream before new ones are dropped.
pub const DEFAULT_STREAM_BUFFER: usize = 1024;

/// Handler that forwards events into an [`EventStream`].
pub(crate) struct StreamHandler {
    sender: mpsc::Sender<EventData>,
}

impl StreamHandler {
    pub(crate) fn new(sender: mpsc::Sender<EventData>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventHandler for StreamHandler {
    async fn handle(&self, event: &EventData) -> Result<(), HandlerError> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => "event stream buffer full, event dropped".into(),
            mpsc::error::TrySendError::Closed(_) => "event stream closed".into(),
        })
    }
}

/// Events of one kind, received with [`EventStream::next`].
///
/// Dropping the stream unsubscribes it.
///
/// # Example
///
/// ```ignore
/// let mut updates = session.events().subscribe_stream(EventKind::TableUpdate).await?;
/// while let Some(event) = updates.next().await {
///     println!("{} changed", event.table);
/// }
/// ```
pub struct EventStream {
    id: HandlerId,
    kind: EventKind,
    receiver: mpsc::Receiver<EventData>,
    manager: Weak<Shared>,
}

impl EventStream {
    pub(crate) fn new(
        id: HandlerId,
        kind: EventKind,
        receiver: mpsc::Receiver<EventData>,
        manager: Weak<Shared>,
    ) -> Self {
        Self {
            id,
            kind,
            receiver,
            manager,
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Wait for the next event. `None` once the stream is closed and drained.
    pub async fn next(&mut self) -> Option<EventData> {
        self.receiver.recv().await
    }

    /// Take an already buffered event without waiting.
    pub fn try_next(&mut self) -> Option<EventData> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving. Buffered events can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if let Some(shared) = self.manager.upgrade() {
            shared.unsubscribe(self.kind, self.id);
        }
        self.manager = Weak::new();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
