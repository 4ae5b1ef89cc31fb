//! In-memory ChainDB server shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chaindb::criteria::{evaluate, Criteria};
use chaindb::{
    connect_with_transport, Channel, ChainDbError, ClientConfig, Connection, Credentials, Document,
    Method, ReconnectPolicy, Request, Result, Session, Transport,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const DATABASE: &str = "test-db";
pub const USER: &str = "admin";
pub const PASSWORD: &str = "secret";
pub const TOKEN: &str = "mock-token";

const API: &str = "/api/v1";

struct Peer {
    id: u64,
    sender: mpsc::UnboundedSender<String>,
    kinds: Arc<Mutex<HashSet<String>>>,
}

#[derive(Default)]
struct ServerState {
    /// Persisted versions per table, oldest first.
    tables: HashMap<String, Vec<Document>>,
    next_doc: u64,
    reject_persist: Option<String>,
    requests: Vec<(Method, String, Option<Value>)>,
    peers: Vec<Peer>,
    channel_opens: usize,
    fail_connects: u32,
    refuse_channels: bool,
    channel_auth_revoked: bool,
}

/// Mock server implementing [`Transport`] directly.
pub struct MockServer {
    state: Mutex<ServerState>,
    latency: Mutex<Option<Duration>>,
    control: Arc<Mutex<Vec<Value>>>,
    next_peer: AtomicU64,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState::default()),
            latency: Mutex::new(None),
            control: Arc::new(Mutex::new(Vec::new())),
            next_peer: AtomicU64::new(1),
        })
    }

    // --- Knobs ---

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Reject every persist and update with `message` until cleared with `None`.
    pub fn reject_persist(&self, message: Option<&str>) {
        self.state.lock().reject_persist = message.map(str::to_string);
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().fail_connects = count;
    }

    pub fn refuse_channels(&self, refuse: bool) {
        self.state.lock().refuse_channels = refuse;
    }

    /// Refuse the session token on new event channels.
    pub fn revoke_channel_auth(&self, revoked: bool) {
        self.state.lock().channel_auth_revoked = revoked;
    }

    /// Seed a table with a persisted version, returning its id.
    pub fn seed(&self, table: &str, data: Value) -> String {
        let Value::Object(data) = data else {
            panic!("seed data must be an object");
        };
        let mut state = self.state.lock();
        store_version(&mut state, table, data)
    }

    /// Delete a stored version, as another client might.
    pub fn remove_doc(&self, table: &str, id: &str) {
        if let Some(history) = self.state.lock().tables.get_mut(table) {
            history.retain(|d| d["doc_id"] != json!(id));
        }
    }

    // --- Observations ---

    pub fn history(&self, table: &str) -> Vec<Document> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn request_count(&self, method: Method, path_prefix: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(m, p, _)| *m == method && p.starts_with(path_prefix))
            .count()
    }

    /// Body of the most recent request to `path`.
    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.state
            .lock()
            .requests
            .iter()
            .rev()
            .find(|(_, p, _)| p == path)
            .and_then(|(_, _, body)| body.clone())
    }

    pub fn control_messages(&self) -> Vec<Value> {
        self.control.lock().clone()
    }

    pub fn channel_opens(&self) -> usize {
        self.state.lock().channel_opens
    }

    pub fn open_channels(&self) -> usize {
        self.state
            .lock()
            .peers
            .iter()
            .filter(|p| !p.sender.is_closed())
            .count()
    }

    /// Whether some open channel has announced interest in `kind`.
    pub fn has_subscriber(&self, kind: &str) -> bool {
        self.state
            .lock()
            .peers
            .iter()
            .any(|p| !p.sender.is_closed() && p.kinds.lock().contains(kind))
    }

    // --- Events ---

    /// Deliver an event to every channel subscribed to `kind`. Returns the
    /// number of channels reached.
    pub fn push_event(&self, kind: &str, table: &str, data: Value) -> usize {
        let message = json!({
            "event_type": kind,
            "database": DATABASE,
            "table": table,
            "data": data,
            "timestamp": 1_700_000_000,
        });
        self.push_raw(kind, &message.to_string())
    }

    /// Deliver raw text to channels subscribed to `kind`.
    pub fn push_raw(&self, kind: &str, text: &str) -> usize {
        let state = self.state.lock();
        state
            .peers
            .iter()
            .filter(|p| p.kinds.lock().contains(kind))
            .filter(|p| p.sender.send(text.to_string()).is_ok())
            .count()
    }

    /// Drop every open channel from the server side.
    pub fn disconnect_all(&self) {
        self.state.lock().peers.clear();
    }

    // --- Request handling ---

    fn handle(&self, request: &Request) -> Result<Value> {
        let mut state = self.state.lock();
        state
            .requests
            .push((request.method, request.path.clone(), request.body.clone()));

        let path = request
            .path
            .strip_prefix(API)
            .ok_or_else(|| ChainDbError::NotFound(request.path.clone()))?;

        if path == "/database/connect" {
            let body = request.body.clone().unwrap_or(Value::Null);
            return Ok(
                if body["name"] == DATABASE && body["user"] == USER && body["password"] == PASSWORD {
                    ok(json!(TOKEN))
                } else {
                    rejected("Invalid credentials")
                },
            );
        }

        match &request.credentials {
            Some(c) if c.token() == TOKEN => {}
            _ => return Err(ChainDbError::Auth("401 Unauthorized".into())),
        }

        let rest = path
            .strip_prefix("/table/")
            .ok_or_else(|| ChainDbError::NotFound(request.path.clone()))?;
        let (route, query) = match rest.split_once('?') {
            Some((route, query)) => (route, Some(query)),
            None => (rest, None),
        };
        let mut segments = route.splitn(3, '/');
        let table = segments.next().unwrap_or_default().to_string();
        let action = segments.next();
        let arg = segments.next();
        let body = request.body.clone().unwrap_or(Value::Null);

        let response = match (request.method, action) {
            (Method::Get, None) => {
                let current = state
                    .tables
                    .get(&table)
                    .and_then(|h| h.last().cloned())
                    .unwrap_or_default();
                ok(Value::Object(current))
            }
            (Method::Post, Some("persist")) => {
                if let Some(message) = &state.reject_persist {
                    rejected(message)
                } else {
                    let Value::Object(data) = body["data"].clone() else {
                        return Ok(rejected("Invalid document: data must be an object"));
                    };
                    let id = store_version(&mut state, &table, data);
                    let stored = find_doc(&state, &table, &id).unwrap_or_default();
                    ok(Value::Object(stored))
                }
            }
            (Method::Post, Some("update")) => {
                if let Some(message) = &state.reject_persist {
                    return Ok(rejected(message));
                }
                let doc_id = body["doc_id"].as_str().unwrap_or_default().to_string();
                let Value::Object(mut data) = body["data"].clone() else {
                    return Ok(rejected("Invalid document: data must be an object"));
                };
                data.insert("doc_id".into(), json!(doc_id));
                let slot = state
                    .tables
                    .get_mut(&table)
                    .and_then(|h| h.iter_mut().find(|d| d["doc_id"] == json!(doc_id)));
                match slot {
                    Some(doc) => {
                        *doc = data.clone();
                        ok(Value::Object(data))
                    }
                    None => rejected("Document not found"),
                }
            }
            (Method::Get, Some("history")) => {
                let limit = query
                    .and_then(|q| q.strip_prefix("limit="))
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(usize::MAX);
                let history: Vec<Value> = state
                    .tables
                    .get(&table)
                    .map(|h| h.iter().rev().take(limit).cloned().map(Value::Object).collect())
                    .unwrap_or_default();
                ok(Value::Array(history))
            }
            (Method::Post, Some("find" | "find-advanced")) => {
                match serde_json::from_value::<Criteria>(body["criteria"].clone()) {
                    Ok(criteria) => {
                        let limit = body["limit"].as_u64().unwrap_or(1000) as usize;
                        let reverse = body["reverse"].as_bool().unwrap_or(true);
                        let newest_first: Vec<Document> = state
                            .tables
                            .get(&table)
                            .map(|h| h.iter().rev().cloned().collect())
                            .unwrap_or_default();
                        let found = evaluate(&newest_first, &criteria, limit, reverse);
                        ok(Value::Array(found.into_iter().map(Value::Object).collect()))
                    }
                    Err(e) => rejected(&format!("Invalid criteria: {e}")),
                }
            }
            (Method::Get, Some("doc")) => match find_doc(&state, &table, arg.unwrap_or_default()) {
                Some(doc) => ok(Value::Object(doc)),
                None => rejected("Document not found"),
            },
            _ => return Err(ChainDbError::NotFound(request.path.clone())),
        };
        Ok(response)
    }
}

fn ok(data: Value) -> Value {
    json!({"success": true, "message": "", "data": data})
}

fn rejected(message: &str) -> Value {
    json!({"success": false, "message": message, "data": null})
}

fn store_version(state: &mut ServerState, table: &str, mut data: Document) -> String {
    state.next_doc += 1;
    let id = format!("doc-{}", state.next_doc);
    data.insert("doc_id".into(), json!(id));
    state.tables.entry(table.to_string()).or_default().push(data);
    id
}

fn find_doc(state: &ServerState, table: &str, id: &str) -> Option<Document> {
    state
        .tables
        .get(table)?
        .iter()
        .find(|d| d["doc_id"] == json!(id))
        .cloned()
}

#[async_trait]
impl Transport for MockServer {
    async fn request(&self, request: Request) -> Result<Value> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.handle(&request)
    }

    async fn open_channel(&self, path: &str, credentials: &Credentials) -> Result<Box<dyn Channel>> {
        if path != format!("{API}/events") {
            return Err(ChainDbError::NotFound(path.to_string()));
        }
        if credentials.token() != TOKEN {
            return Err(ChainDbError::Auth("401 Unauthorized".into()));
        }

        let mut state = self.state.lock();
        if state.channel_auth_revoked {
            return Err(ChainDbError::Auth("401 Unauthorized".into()));
        }
        if state.refuse_channels {
            return Err(ChainDbError::Transport("connection refused".into()));
        }
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(ChainDbError::Transport("connection refused".into()));
        }

        state.channel_opens += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        let kinds = Arc::new(Mutex::new(HashSet::new()));
        let id = self.next_peer.fetch_add(1, Ordering::SeqCst);
        state.peers.push(Peer {
            id,
            sender,
            kinds: Arc::clone(&kinds),
        });

        Ok(Box::new(MockChannel {
            id,
            receiver,
            kinds,
            control: Arc::clone(&self.control),
            closed: false,
        }))
    }
}

/// Client end of a mock event channel.
pub struct MockChannel {
    id: u64,
    receiver: mpsc::UnboundedReceiver<String>,
    kinds: Arc<Mutex<HashSet<String>>>,
    control: Arc<Mutex<Vec<Value>>>,
    closed: bool,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, message: String) -> Result<()> {
        if self.closed {
            return Err(ChainDbError::Transport(format!("channel {} is closed", self.id)));
        }
        let value: Value = serde_json::from_str(&message)?;
        let kind = value["event"].as_str().unwrap_or_default().to_string();
        match value["action"].as_str() {
            Some("subscribe") => {
                self.kinds.lock().insert(kind);
            }
            Some("unsubscribe") => {
                self.kinds.lock().remove(&kind);
            }
            _ => return Err(ChainDbError::Protocol(format!("unexpected control message {message}"))),
        }
        self.control.lock().push(value);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.receiver.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.receiver.close();
        self.kinds.lock().clear();
        Ok(())
    }
}

// --- Session helpers ---

pub fn connection() -> Connection {
    Connection::new(DATABASE, USER, PASSWORD)
}

/// Config with short timeouts and a quick reconnect schedule.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(1),
        handler_timeout: Duration::from_millis(500),
        reconnect: ReconnectPolicy {
            max_attempts: Some(4),
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            multiplier: 2.0,
        },
        ..ClientConfig::default()
    }
}

pub async fn session(server: &Arc<MockServer>) -> Session {
    session_with(server, fast_config()).await
}

/// Route client logs to the test output. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub async fn session_with(server: &Arc<MockServer>, config: ClientConfig) -> Session {
    init_tracing();
    let transport: Arc<dyn Transport> = server.clone();
    connect_with_transport(connection(), config, transport)
        .await
        .expect("mock connect")
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
