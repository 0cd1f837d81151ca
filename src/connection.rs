//! Client connections to a [`FakeServer`].
//!
//! A [`FakeConnection`] plays the part of a socket: callers feed it raw RESP
//! bytes and read decoded responses back. Each connection owns its parser,
//! its transaction state and its inbox, and shares everything else with the
//! server.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::commands::blocking;
use crate::commands::command_dispatcher::{dispatch, DispatchOutcome, QueuedCommand};
use crate::key_value_store::ClientId;
use crate::resp::{encode_command, RespError, RespParser, RespValue};
use crate::server::{FakeServer, ServerState};

/// Transport-level failures. These never reach the client as RESP errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("FakeRedis is emulating a connection error.")]
    Disconnected,
    #[error("Connection closed")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] RespError),
    #[error("No response available")]
    NoResponse,
    #[error("Blocking operation cancelled")]
    Cancelled,
}

/// Per-connection state the dispatcher works on.
#[derive(Debug)]
pub struct Session {
    pub id: ClientId,
    /// Selected database index.
    pub db: usize,
    /// Commands queued since MULTI, `None` outside a transaction.
    pub transaction: Option<Vec<QueuedCommand>>,
    pub transaction_failed: bool,
    /// Set while EXEC replays the queued commands.
    pub in_exec: bool,
    pub watches: HashSet<(usize, Bytes)>,
    /// Number of active channel and pattern subscriptions.
    pub subscriptions: usize,
    /// While set, pushed messages are collected here instead of being sent.
    captured: Option<Vec<RespValue>>,
    outbox: mpsc::UnboundedSender<RespValue>,
}

impl Session {
    fn new(id: ClientId, outbox: mpsc::UnboundedSender<RespValue>) -> Self {
        Session {
            id,
            db: 0,
            transaction: None,
            transaction_failed: false,
            in_exec: false,
            watches: HashSet::new(),
            subscriptions: 0,
            captured: None,
            outbox,
        }
    }

    /// Queues a message for this connection's reader.
    pub fn push(&mut self, message: RespValue) {
        if let Some(captured) = self.captured.as_mut() {
            captured.push(message);
            return;
        }
        // The receiving half lives as long as the connection itself.
        let _ = self.outbox.send(message);
    }

    /// Starts collecting pushed messages instead of sending them.
    pub fn start_capture(&mut self) {
        self.captured = Some(Vec::new());
    }

    /// Stops collecting and returns what was pushed since
    /// [`start_capture`](Self::start_capture).
    pub fn finish_capture(&mut self) -> Vec<RespValue> {
        self.captured.take().unwrap_or_default()
    }

    /// Drops every WATCH and resets the invalidation flag.
    pub fn clear_watches(&mut self, state: &mut ServerState) {
        for (db, key) in self.watches.drain() {
            if let Some(database) = state.databases.get_mut(db) {
                database.unwatch(&key, self.id);
            }
        }
        if let Some(record) = state.clients.get_mut(&self.id) {
            record.watch_invalidated = false;
        }
    }
}

/// Signals a connection shutdown to a pending async blocking wait.
#[derive(Debug, Default)]
pub struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

/// Cloneable handle that closes a connection from elsewhere, e.g. another
/// task while this connection is parked in BLPOP.
#[derive(Debug, Clone)]
pub struct CloseHandle(Arc<CloseSignal>);

impl CloseHandle {
    pub fn close(&self) {
        self.0.close();
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    server: Arc<FakeServer>,
    session: Session,
    parser: RespParser,
    responses: mpsc::UnboundedReceiver<RespValue>,
    close: Arc<CloseSignal>,
    detached: bool,
}

impl FakeConnection {
    pub(crate) fn new(
        server: Arc<FakeServer>,
        id: ClientId,
        outbox: mpsc::UnboundedSender<RespValue>,
        responses: mpsc::UnboundedReceiver<RespValue>,
    ) -> Self {
        FakeConnection {
            server,
            session: Session::new(id, outbox),
            parser: RespParser::new(),
            responses,
            close: Arc::new(CloseSignal::default()),
            detached: false,
        }
    }

    pub fn id(&self) -> ClientId {
        self.session.id
    }

    pub fn server(&self) -> &Arc<FakeServer> {
        &self.server
    }

    /// Feeds raw protocol bytes and runs every command they complete.
    ///
    /// Blocking commands park the calling thread until they are satisfied or
    /// time out.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        self.parser.feed(data);

        while let Some(fields) = self.next_command()? {
            let outcome = {
                let mut state = self.server.lock();
                dispatch(&mut state, &mut self.session, fields)
            };
            match outcome {
                DispatchOutcome::Reply(reply) => self.session.push(reply),
                DispatchOutcome::NoReply => {}
                DispatchOutcome::Block(request) => {
                    let reply = blocking::wait_blocking(&self.server, &request);
                    self.session.push(reply);
                }
            }
        }
        Ok(())
    }

    /// Like [`feed`](Self::feed), but blocking commands suspend the task
    /// instead of the thread. A wait is abandoned with
    /// [`ConnectionError::Cancelled`] when the connection is closed through
    /// its [`CloseHandle`].
    pub async fn feed_async(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        self.parser.feed(data);

        while let Some(fields) = self.next_command()? {
            let outcome = {
                let mut state = self.server.lock();
                dispatch(&mut state, &mut self.session, fields)
            };
            match outcome {
                DispatchOutcome::Reply(reply) => self.session.push(reply),
                DispatchOutcome::NoReply => {}
                DispatchOutcome::Block(request) => {
                    let reply =
                        blocking::wait_blocking_async(&self.server, &request, &self.close).await?;
                    self.session.push(reply);
                }
            }
        }
        Ok(())
    }

    /// Pops the next queued response.
    pub fn read_response(&mut self) -> Result<RespValue, ConnectionError> {
        match self.responses.try_recv() {
            Ok(response) => Ok(response),
            Err(_) if !self.server.is_connected() => Err(ConnectionError::Disconnected),
            Err(_) => Err(ConnectionError::NoResponse),
        }
    }

    /// Polls for a response for up to `timeout`. Useful for pub/sub messages
    /// published from another thread.
    pub fn read_response_timeout(&mut self, timeout: Duration) -> Result<RespValue, ConnectionError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.read_response() {
                Err(ConnectionError::NoResponse) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                result => return result,
            }
        }
    }

    /// Waits for the next response.
    pub async fn next_response(&mut self) -> Result<RespValue, ConnectionError> {
        self.responses.recv().await.ok_or(ConnectionError::Closed)
    }

    /// Sends one command and returns its reply.
    pub fn execute<I, A>(&mut self, args: I) -> Result<RespValue, ConnectionError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.feed(&encode_command(args))?;
        self.read_response()
    }

    pub async fn execute_async<I, A>(&mut self, args: I) -> Result<RespValue, ConnectionError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let frame = encode_command(args);
        self.feed_async(&frame).await?;
        self.read_response()
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(Arc::clone(&self.close))
    }

    /// Detaches from the server, dropping subscriptions and watches. Called
    /// automatically on drop.
    pub fn disconnect(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.close.close();

        let mut state = self.server.lock();
        state.pubsub.remove_client(self.session.id);
        self.session.clear_watches(&mut state);
        state.clients.remove(&self.session.id);
        debug!(client = self.session.id, "client disconnected");
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        if self.detached || self.close.is_closed() {
            return Err(ConnectionError::Closed);
        }
        if !self.server.is_connected() {
            return Err(ConnectionError::Disconnected);
        }
        Ok(())
    }

    fn next_command(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        match self.parser.next_command() {
            Ok(fields) => Ok(fields),
            Err(err) => {
                warn!(client = self.session.id, error = %err, "discarding malformed input");
                self.parser.reset();
                Err(err.into())
            }
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
