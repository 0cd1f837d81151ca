//! The shared in-process server.
//!
//! A [`FakeServer`] owns every database, the pub/sub registry and the script
//! cache behind a single mutex. Connections created with
//! [`FakeServer::connect`] share it, and every command runs with the lock
//! held, so commands are linearizable across connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::commands::scripting::ScriptRuntime;
use crate::config::{ConfigError, ServerConfig};
use crate::connection::FakeConnection;
use crate::key_value_store::{ClientId, Database};
use crate::pub_sub::PubSubRegistry;
use crate::resp::RespValue;

/// Per-connection data other connections may need to reach.
#[derive(Debug)]
pub struct ClientRecord {
    pub outbox: mpsc::UnboundedSender<RespValue>,
    pub watch_invalidated: bool,
}

/// Everything guarded by the server lock.
pub struct ServerState {
    pub databases: Vec<Database>,
    pub clients: HashMap<ClientId, ClientRecord>,
    pub pubsub: PubSubRegistry,
    pub scripts: HashMap<Bytes, Bytes>,
    pub script_runtime: Option<Arc<dyn ScriptRuntime>>,
    pub last_save: i64,
    clock: f64,
}

impl ServerState {
    fn new(config: &ServerConfig) -> Self {
        ServerState {
            databases: (0..config.databases).map(|_| Database::new()).collect(),
            clients: HashMap::new(),
            pubsub: PubSubRegistry::new(),
            scripts: HashMap::new(),
            script_runtime: None,
            last_save: unix_time() as i64,
            clock: 0.0,
        }
    }

    /// Moves the virtual clock to the current wall-clock time. The clock
    /// never goes backwards.
    pub fn advance_clock(&mut self) {
        self.clock = self.clock.max(unix_time());
        for database in &mut self.databases {
            database.time = self.clock;
        }
    }

    pub fn now(&self) -> f64 {
        self.clock
    }

    pub fn database(&mut self, index: usize) -> &mut Database {
        &mut self.databases[index]
    }

    /// Marks the watches of `clients` as invalidated.
    pub fn invalidate_watches(&mut self, clients: Vec<ClientId>) {
        for client in clients {
            if let Some(record) = self.clients.get_mut(&client) {
                record.watch_invalidated = true;
            }
        }
    }

    /// Queues `message` on a client's inbox. Closed inboxes are ignored.
    pub fn deliver(&self, client: ClientId, message: RespValue) -> bool {
        match self.clients.get(&client) {
            Some(record) => record.outbox.send(message).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("databases", &self.databases.len())
            .field("clients", &self.clients.len())
            .field("scripts", &self.scripts.len())
            .field("script_runtime", &self.script_runtime.is_some())
            .finish()
    }
}

/// Seconds since the Unix epoch as a float.
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug)]
pub struct FakeServer {
    state: Mutex<ServerState>,
    connected: AtomicBool,
    next_client_id: AtomicU64,
    next_listener_id: AtomicU64,
}

impl FakeServer {
    /// Creates a server with the default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Arc<Self> {
        info!(databases = config.databases, connected = config.connected, "creating fake server");
        Arc::new(FakeServer {
            state: Mutex::new(ServerState::new(&config)),
            connected: AtomicBool::new(config.connected),
            next_client_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
        })
    }

    /// Creates a server from command-line style flags, see
    /// [`ServerConfig::from_args`].
    pub fn from_args<I, S>(args: I) -> Result<Arc<Self>, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::with_config(ServerConfig::from_args(args)?))
    }

    /// Attaches a new client connection.
    pub fn connect(self: &Arc<Self>) -> FakeConnection {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (outbox, inbox) = mpsc::unbounded_channel();
        self.lock().clients.insert(
            id,
            ClientRecord {
                outbox: outbox.clone(),
                watch_invalidated: false,
            },
        );
        debug!(client = id, "client connected");
        FakeConnection::new(Arc::clone(self), id, outbox, inbox)
    }

    /// Simulates the transport going down (`false`) or coming back (`true`).
    pub fn set_connected(&self, connected: bool) {
        info!(connected, "server connection state changed");
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Installs the interpreter used by EVAL and EVALSHA.
    pub fn set_script_runtime(&self, runtime: Arc<dyn ScriptRuntime>) {
        self.lock().script_runtime = Some(runtime);
    }

    pub fn database_count(&self) -> usize {
        self.lock().databases.len()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_listener_id(&self) -> u64 {
        self.next_listener_id.fetch_add(1, Ordering::Relaxed)
    }
}
