//! Event subscription manager.
//!
//! One background task owns the event channel: it announces interest,
//! reads inbound messages and re-opens the channel with backoff when it
//! drops. Decoded events go through a bounded queue to the manager's single
//! dispatcher task, which invokes handlers one at a time, so a slow handler
//! delays later events but never the channel reader. The dispatcher
//! outlives individual connections, so events keep their arrival order
//! across a lost channel and a fresh subscribe.

use super::registry::HandlerRegistry;
use super::stream::{EventStream, StreamHandler, DEFAULT_STREAM_BUFFER};
use super::types::{
    encode_control, Action, ConnectionState, EventData, EventHandler, EventKind, HandlerId,
};
use crate::client::Client;
use crate::error::{ChainDbError, Result};
use crate::transport::{endpoints, Channel};
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

enum Command {
    Announce(EventKind),
    Retract(EventKind),
    Close,
}

/// Events waiting for dispatch when the handlers fall behind. Further
/// events are dropped until the queue drains.
pub const DISPATCH_BUFFER: usize = 4096;

/// A decoded event tagged with the registry epoch it was read under.
struct Queued {
    epoch: u64,
    event: EventData,
}

/// Why a connection task stopped.
enum Exit {
    Closed,
    Idle,
    Lost(ChainDbError),
}

struct ConnectionHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// State shared by every manager handle and the background tasks.
pub(crate) struct Shared {
    client: Arc<Client>,
    registry: HandlerRegistry,
    state: watch::Sender<ConnectionState>,
    connection: Mutex<Option<ConnectionHandle>>,
    generation: AtomicU64,
    /// Terminal failure of the last connection, kept until read.
    lost: Mutex<Option<ChainDbError>>,
    /// Feeds the dispatcher; shared by every connection generation.
    inbox: mpsc::Sender<Queued>,
    /// Receiving end, until the dispatcher is spawned on first connect.
    dispatcher: Mutex<Option<mpsc::Receiver<Queued>>>,
    /// Bumped by `close_events` so events read before it are skipped.
    epoch: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Event channel state changed");
        }
    }

    fn send_command(&self, command: Command) {
        if let Some(connection) = self.connection.lock().as_ref() {
            let _ = connection.commands.send(command);
        }
    }

    /// Queue an event for dispatch without waiting on slow handlers.
    fn enqueue(&self, event: EventData) {
        let queued = Queued {
            epoch: self.epoch.load(Ordering::SeqCst),
            event,
        };
        match self.inbox.try_send(queued) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(queued)) => tracing::warn!(
                event = %queued.event.event_type,
                table = %queued.event.table,
                capacity = DISPATCH_BUFFER,
                "Dispatch queue full, dropping event"
            ),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Dispatcher stopped, dropping event")
            }
        }
    }

    pub(crate) fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let removal = self.registry.remove(kind, id);
        if removal.removed {
            tracing::debug!(event = %kind, handler = %id, "Removed event handler");
        }
        if removal.kind_now_empty {
            self.send_command(Command::Retract(kind));
        }
        removal.removed
    }
}

/// Closes the channel once the last manager handle is gone.
struct Lifeline {
    shared: Weak<Shared>,
}

impl Drop for Lifeline {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            if let Some(connection) = shared.connection.lock().take() {
                let _ = connection.commands.send(Command::Close);
            }
        }
    }
}

/// Registers event handlers and keeps the event channel alive while any
/// are registered.
///
/// The channel opens lazily on the first subscription. Cloning yields
/// another handle to the same manager.
#[derive(Clone)]
pub struct EventSubscriptionManager {
    shared: Arc<Shared>,
    _lifeline: Arc<Lifeline>,
}

impl EventSubscriptionManager {
    pub(crate) fn new(client: Arc<Client>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (inbox, dispatcher) = mpsc::channel(DISPATCH_BUFFER);
        let shared = Arc::new(Shared {
            client,
            registry: HandlerRegistry::new(),
            state,
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
            lost: Mutex::new(None),
            inbox,
            dispatcher: Mutex::new(Some(dispatcher)),
            epoch: AtomicU64::new(0),
        });
        let lifeline = Arc::new(Lifeline {
            shared: Arc::downgrade(&shared),
        });
        Self {
            shared,
            _lifeline: lifeline,
        }
    }

    /// Register `handler` for `kind`, opening the channel if needed.
    ///
    /// Resolves once the channel is open (or being re-opened). If it cannot
    /// be opened the registration is rolled back and the error returned.
    pub async fn subscribe(&self, kind: EventKind, handler: impl EventHandler) -> Result<HandlerId> {
        self.subscribe_arc(kind, Arc::new(handler)).await
    }

    /// Like [`subscribe`](Self::subscribe) for an already shared handler.
    pub async fn subscribe_arc(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<HandlerId> {
        let (id, newly_active) = self.shared.registry.insert(kind, handler);
        tracing::debug!(event = %kind, handler = %id, "Registered event handler");

        match self.ensure_connected().await {
            Ok(started) => {
                // A freshly started connection announces every active kind itself.
                if newly_active && !started {
                    self.shared.send_command(Command::Announce(kind));
                }
                Ok(id)
            }
            Err(e) => {
                self.shared.registry.remove(kind, id);
                Err(e)
            }
        }
    }

    /// Subscribe with a buffered stream instead of a callback.
    pub async fn subscribe_stream(&self, kind: EventKind) -> Result<EventStream> {
        let (sender, receiver) = mpsc::channel(DEFAULT_STREAM_BUFFER);
        let id = self.subscribe(kind, StreamHandler::new(sender)).await?;
        Ok(EventStream::new(id, kind, receiver, Arc::downgrade(&self.shared)))
    }

    /// Remove one handler. Returns false if it was not registered for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        self.shared.unsubscribe(kind, id)
    }

    /// Remove every handler of `kind`, returning how many were removed.
    pub fn unsubscribe_all(&self, kind: EventKind) -> usize {
        let removed = self.shared.registry.remove_all(kind);
        if removed > 0 {
            tracing::debug!(event = %kind, removed, "Removed all event handlers");
            self.shared.send_command(Command::Retract(kind));
        }
        removed
    }

    /// Close the channel and drop every handler. Safe to call repeatedly;
    /// a later `subscribe` opens a new channel.
    pub async fn close_events(&self) {
        let connection = self.shared.connection.lock().take();
        self.shared.registry.clear();

        if let Some(connection) = connection {
            let _ = connection.commands.send(Command::Close);
            if let Err(e) = connection.task.await {
                if e.is_panic() {
                    tracing::error!(generation = connection.generation, "Event channel task panicked");
                }
            }
            tracing::info!("Event channel closed");
        }

        // The old channel is gone, so nothing read under the previous epoch
        // can reach handlers registered from here on.
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.lost.lock().take();
        if self.shared.connection.lock().is_none() {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Wait until the channel reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> Result<()> {
        let mut receiver = self.shared.state.subscribe();
        let reached = tokio::time::timeout(timeout, receiver.wait_for(|state| *state == target))
            .await
            .map(|waited| waited.is_ok());
        match reached {
            Ok(true) => Ok(()),
            Ok(false) => Err(ChainDbError::ConnectionLost { attempts: 0 }),
            Err(_) => Err(ChainDbError::Timeout {
                operation: format!("waiting for event channel state {target:?}"),
                elapsed: timeout,
            }),
        }
    }

    /// The terminal error of a channel that gave up reconnecting.
    ///
    /// Returned once; `None` if the channel is healthy or was closed on request.
    pub fn take_connection_lost(&self) -> Option<ChainDbError> {
        self.shared.lost.lock().take()
    }

    pub fn handler_count(&self) -> usize {
        self.shared.registry.handler_count()
    }

    pub fn subscribed_kinds(&self) -> Vec<EventKind> {
        self.shared.registry.active_kinds()
    }

    /// Start a connection task unless one is running, then wait for it to
    /// leave `Connecting`. Returns true when this call started the task.
    async fn ensure_connected(&self) -> Result<bool> {
        let started = {
            let mut connection = self.shared.connection.lock();
            let running = connection
                .as_ref()
                .is_some_and(|c| !c.commands.is_closed());
            if running {
                false
            } else {
                if let Some(inbox) = self.shared.dispatcher.lock().take() {
                    tokio::spawn(dispatch(Arc::downgrade(&self.shared), inbox));
                }
                let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let (commands, receiver) = mpsc::unbounded_channel();
                self.shared.lost.lock().take();
                self.shared.set_state(ConnectionState::Connecting);
                let task = tokio::spawn(run_connection(Arc::clone(&self.shared), receiver, generation));
                *connection = Some(ConnectionHandle {
                    generation,
                    commands,
                    task,
                });
                true
            }
        };

        let mut receiver = self.shared.state.subscribe();
        let state = receiver
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state);

        match state {
            Ok(ConnectionState::Disconnected) | Err(_) => Err(self
                .shared
                .lost
                .lock()
                .take()
                .unwrap_or(ChainDbError::ConnectionLost { attempts: 0 })),
            Ok(_) => Ok(started),
        }
    }
}

impl fmt::Debug for EventSubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscriptionManager")
            .field("state", &self.state())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    generation: u64,
) {
    loop {
        let exit = drive(&shared, &mut commands).await;
        if !settle(&shared, &mut commands, generation, exit) {
            return;
        }
    }
}

/// Record how a connection task stopped. Returns true when the task must
/// reopen the channel instead of exiting.
fn settle(
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    generation: u64,
    exit: Exit,
) -> bool {
    // Serialized with `ensure_connected` so a new subscriber never waits on
    // a task that is already gone.
    let mut connection = shared.connection.lock();
    let current = connection.as_ref().map_or(true, |c| c.generation == generation);

    // A subscriber that saw this task running counts on it to carry its
    // handler.
    if matches!(exit, Exit::Idle) && current && connection.is_some() && !shared.registry.is_empty() {
        tracing::debug!(generation, "Handler registered while going idle, reopening");
        shared.set_state(ConnectionState::Reconnecting);
        return true;
    }

    commands.close();
    match exit {
        Exit::Lost(e) => {
            tracing::error!(generation, error = %e, "Event channel lost");
            if current {
                *shared.lost.lock() = Some(e);
            }
        }
        Exit::Idle => tracing::info!("Event channel dropped with no handlers registered"),
        Exit::Closed => {}
    }
    // A newer connection owns the state from here on.
    if current {
        *connection = None;
        shared.set_state(ConnectionState::Disconnected);
    }
    false
}

async fn drive(shared: &Shared, commands: &mut mpsc::UnboundedReceiver<Command>) -> Exit {
    let mut channel = match connect(shared, commands).await {
        Ok(channel) => channel,
        Err(exit) => return exit,
    };

    loop {
        let failure = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Announce(kind)) => {
                    announce(channel.as_mut(), Action::Subscribe, kind).await.err()
                }
                Some(Command::Retract(kind)) => {
                    if shared.registry.has_handlers(kind) {
                        None
                    } else {
                        announce(channel.as_mut(), Action::Unsubscribe, kind).await.err()
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = channel.close().await {
                        tracing::debug!(error = %e, "Error closing event channel");
                    }
                    return Exit::Closed;
                }
            },
            inbound = channel.receive() => match inbound {
                Ok(Some(text)) => {
                    route(shared, &text);
                    None
                }
                Ok(None) => Some(ChainDbError::Transport("event channel closed by server".into())),
                Err(e) => Some(e),
            },
        };

        let Some(failure) = failure else { continue };

        if shared.registry.is_empty() {
            return Exit::Idle;
        }
        tracing::warn!(error = %failure, "Event channel dropped, reconnecting");
        shared.set_state(ConnectionState::Reconnecting);
        channel = match connect(shared, commands).await {
            Ok(channel) => channel,
            Err(exit) => return exit,
        };
    }
}

/// Open the channel, retrying per the reconnect policy. Commands other
/// than `Close` are dropped while waiting; a successful open announces
/// every active kind anyway.
async fn connect(
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> std::result::Result<Box<dyn Channel>, Exit> {
    let policy = &shared.client.config().reconnect;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let error = match open(shared).await {
            Ok(channel) => {
                tracing::info!(attempts, "Event channel connected");
                shared.set_state(ConnectionState::Connected);
                return Ok(channel);
            }
            Err(ChainDbError::Auth(reason)) => {
                tracing::error!(attempts, %reason, "Event channel refused credentials");
                return Err(Exit::Lost(ChainDbError::ConnectionLost { attempts }));
            }
            Err(e) => e,
        };

        if !policy.allows(attempts) {
            tracing::warn!(attempts, error = %error, "Giving up on event channel");
            return Err(Exit::Lost(ChainDbError::ConnectionLost { attempts }));
        }

        let delay = policy.delay_for(attempts);
        tracing::warn!(attempt = attempts, ?delay, error = %error, "Event channel connect failed, retrying");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(Command::Close) | None => return Err(Exit::Closed),
                    Some(_) => {}
                },
            }
        }
    }
}

async fn open(shared: &Shared) -> Result<Box<dyn Channel>> {
    let path = endpoints::events();
    let timeout = shared.client.config().connect_timeout;
    let opening = shared
        .client
        .transport()
        .open_channel(&path, shared.client.credentials());

    let mut channel = tokio::time::timeout(timeout, opening)
        .await
        .map_err(|_| ChainDbError::Timeout {
            operation: format!("open {path}"),
            elapsed: timeout,
        })??;

    for kind in shared.registry.active_kinds() {
        announce(channel.as_mut(), Action::Subscribe, kind).await?;
    }
    Ok(channel)
}

async fn announce(channel: &mut dyn Channel, action: Action, kind: EventKind) -> Result<()> {
    let message = encode_control(action, kind)?;
    channel.send(message).await?;
    tracing::debug!(event = %kind, ?action, "Sent event interest");
    Ok(())
}

fn route(shared: &Shared, text: &str) {
    match EventData::decode(text) {
        Ok(Some(event)) => shared.enqueue(event),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Skipping malformed event message"),
    }
}

/// Invoke handlers for each event in arrival order. Runs once per manager
/// and stops when the manager is dropped.
async fn dispatch(shared: Weak<Shared>, mut inbox: mpsc::Receiver<Queued>) {
    while let Some(Queued { epoch, event }) = inbox.recv().await {
        let Some(shared) = shared.upgrade() else { break };
        if epoch != shared.epoch.load(Ordering::SeqCst) {
            tracing::debug!(event = %event.event_type, "Skipping event read before close");
            continue;
        }
        deliver(&shared, &event).await;
    }
}

async fn deliver(shared: &Shared, event: &EventData) {
    let handlers = shared.registry.handlers_for(event.event_type);
    if handlers.is_empty() {
        tracing::debug!(event = %event.event_type, "No handlers for event");
        return;
    }

    let timeout = shared.client.config().handler_timeout;
    for (id, handler) in handlers {
        let call = AssertUnwindSafe(handler.handle(event)).catch_unwind();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                tracing::warn!(event = %event.event_type, handler = %id, error = %e, "Event handler failed")
            }
            Ok(Err(_)) => {
                tracing::error!(event = %event.event_type, handler = %id, "Event handler panicked")
            }
            Err(_) => {
                tracing::warn!(event = %event.event_type, handler = %id, ?timeout, "Event handler timed out")
            }
        }
    }
}
