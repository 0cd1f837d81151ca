//! Waiting for list data: BLPOP, BRPOP and BRPOPLPUSH.
//!
//! A blocking command first tries its pop while the dispatcher holds the
//! server lock. When nothing is available it hands a [`BlockingRequest`] back
//! to the connection, which waits with the lock released and retries the pop
//! each time the database reports a change.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::debug;

use crate::commands::command_error::CommandError;
use crate::commands::command_item::KeyItems;
use crate::connection::{CloseSignal, ConnectionError};
use crate::key_value_store::Database;
use crate::resp::RespValue;
use crate::server::{FakeServer, ServerState};

#[derive(Debug, Clone, PartialEq)]
pub enum BlockingKind {
    /// Pop from the first non-empty list, from the head when `left`.
    Pop { keys: Vec<Bytes>, left: bool },
    /// Move the tail of `source` to the head of `destination`.
    PopPush { source: Bytes, destination: Bytes },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockingRequest {
    pub kind: BlockingKind,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    /// Database the keys live in.
    pub db: usize,
}

impl BlockingRequest {
    /// Builds a request from a timeout in seconds, where 0 means forever.
    pub fn new(kind: BlockingKind, timeout: i64, db: usize) -> Self {
        let timeout = u64::try_from(timeout)
            .ok()
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);
        BlockingRequest { kind, timeout, db }
    }

    /// Runs one non-blocking attempt and writes the touched keys back.
    ///
    /// Returns `Ok(None)` when there is nothing to pop yet. On the first pass
    /// a key of the wrong kind is an error, later passes skip it.
    pub fn attempt(&self, state: &mut ServerState, first_pass: bool) -> Result<Option<RespValue>, CommandError> {
        let mut items = KeyItems::new();
        let result = self.pass(state.database(self.db), &mut items, first_pass);
        match result {
            Ok(reply) => {
                let invalidated = items.commit(state.database(self.db));
                state.invalidate_watches(invalidated);
                Ok(reply)
            }
            Err(err) => {
                items.restore(state.database(self.db));
                Err(err)
            }
        }
    }

    fn pass(&self, db: &mut Database, items: &mut KeyItems, first_pass: bool) -> Result<Option<RespValue>, CommandError> {
        match &self.kind {
            BlockingKind::Pop { keys, left } => {
                for key in keys {
                    let handle = items.resolve(db, key);
                    let item = items.get_mut(handle);
                    let list = match item.as_list() {
                        Ok(list) => list,
                        Err(err) if first_pass => return Err(err),
                        Err(_) => continue,
                    };
                    let popped = if *left { list.pop_front() } else { list.pop_back() };
                    if let Some(element) = popped {
                        item.mark_updated();
                        return Ok(Some(RespValue::bulk_array([key.clone(), element])));
                    }
                }
                Ok(None)
            }
            BlockingKind::PopPush {
                source,
                destination,
            } => {
                let source = items.resolve(db, source);
                match items.get_mut(source).as_list() {
                    Ok(list) if !list.is_empty() => {}
                    Err(err) if first_pass => return Err(err),
                    _ => return Ok(None),
                }
                let destination = items.resolve(db, destination);
                items.get_mut(destination).as_list()?;

                let Some(element) = items.get_mut(source).as_list()?.pop_back() else {
                    return Ok(None);
                };
                items.get_mut(source).mark_updated();
                items
                    .get_mut(destination)
                    .as_list()?
                    .push_front(element.clone());
                items.get_mut(destination).mark_updated();
                Ok(Some(RespValue::BulkString(element)))
            }
        }
    }
}

/// Parks the calling thread until `request` succeeds or times out.
///
/// The server lock is only held while attempting; the wait itself goes
/// through the database's condition variable, which releases it.
pub fn wait_blocking(server: &FakeServer, request: &BlockingRequest) -> RespValue {
    let deadline = request.timeout.map(|timeout| Instant::now() + timeout);
    let mut state = server.lock();
    let condition = state.database(request.db).condition();

    loop {
        state.advance_clock();
        match request.attempt(&mut state, false) {
            Ok(Some(reply)) => return reply,
            Ok(None) => {}
            Err(err) => return err.as_resp(),
        }

        state = match deadline {
            None => condition.wait(state).unwrap_or_else(PoisonError::into_inner),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return RespValue::Null;
                }
                let (guard, _) = condition
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                guard
            }
        };
        debug!(db = request.db, "blocked client woke up");
    }
}

/// Removes a change listener from its database when dropped, including when
/// the waiting future is cancelled.
struct ListenerGuard<'a> {
    server: &'a FakeServer,
    db: usize,
    id: u64,
}

impl<'a> ListenerGuard<'a> {
    fn register(server: &'a FakeServer, db: usize, listener: Arc<Notify>) -> Self {
        let id = server.next_listener_id();
        server.lock().database(db).add_change_listener(id, listener);
        ListenerGuard { server, db, id }
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.server
            .lock()
            .database(self.db)
            .remove_change_listener(self.id);
    }
}

fn attempt_locked(server: &FakeServer, request: &BlockingRequest) -> Option<RespValue> {
    let mut state = server.lock();
    state.advance_clock();
    match request.attempt(&mut state, false) {
        Ok(reply) => reply,
        Err(err) => Some(err.as_resp()),
    }
}

/// Suspends the calling task until `request` succeeds, times out, or the
/// connection is closed through `close`.
pub async fn wait_blocking_async(
    server: &Arc<FakeServer>,
    request: &BlockingRequest,
    close: &CloseSignal,
) -> Result<RespValue, ConnectionError> {
    let listener = Arc::new(Notify::new());
    let _guard = ListenerGuard::register(server, request.db, Arc::clone(&listener));
    let deadline = request
        .timeout
        .map(|timeout| tokio::time::Instant::now() + timeout);

    loop {
        // Change notifications store a permit, so a write landing between
        // the attempt and the select below is not lost.
        if let Some(reply) = attempt_locked(server, request) {
            return Ok(reply);
        }

        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = listener.notified() => {
                debug!(db = request.db, "blocked task woke up");
            }
            _ = expired => return Ok(RespValue::Null),
            _ = close.closed() => return Err(ConnectionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::key_value_store::{Item, Value};
    use std::collections::VecDeque;

    fn b(value: &'static str) -> Bytes {
        Bytes::from_static(value.as_bytes())
    }

    fn list(values: &[&'static str]) -> Item {
        Item::new(Value::List(values.iter().map(|value| b(value)).collect::<VecDeque<_>>()))
    }

    #[test]
    fn test_timeout_zero_waits_forever() {
        let request = BlockingRequest::new(BlockingKind::Pop { keys: vec![], left: true }, 0, 0);
        assert_eq!(request.timeout, None);

        let request = BlockingRequest::new(BlockingKind::Pop { keys: vec![], left: true }, 3, 0);
        assert_eq!(request.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_pop_skips_wrong_kind_after_first_pass() {
        let server = FakeServer::with_config(ServerConfig::default());
        let mut state = server.lock();
        state
            .database(0)
            .set(b("s"), Item::new(Value::String(b("x"))));
        state.database(0).set(b("l"), list(&["a", "b"]));

        let request = BlockingRequest::new(
            BlockingKind::Pop {
                keys: vec![b("s"), b("l")],
                left: false,
            },
            1,
            0,
        );

        assert_eq!(request.attempt(&mut state, true), Err(CommandError::WrongType));
        assert_eq!(
            request.attempt(&mut state, false),
            Ok(Some(RespValue::bulk_array([b("l"), b("b")])))
        );
        assert!(state.database(0).contains_key(b"s"));
    }

    #[test]
    fn test_pop_push_onto_same_list_rotates() {
        let server = FakeServer::with_config(ServerConfig::default());
        let mut state = server.lock();
        state.database(0).set(b("l"), list(&["a", "b", "c"]));

        let request = BlockingRequest::new(
            BlockingKind::PopPush {
                source: b("l"),
                destination: b("l"),
            },
            0,
            0,
        );

        assert_eq!(
            request.attempt(&mut state, true),
            Ok(Some(RespValue::bulk(b("c"))))
        );
        assert_eq!(state.database(0).get(b"l").map(|item| item.value.clone()), Some(list(&["c", "a", "b"]).value));
    }

    #[test]
    fn test_empty_source_does_not_create_destination() {
        let server = FakeServer::with_config(ServerConfig::default());
        let mut state = server.lock();

        let request = BlockingRequest::new(
            BlockingKind::PopPush {
                source: b("missing"),
                destination: b("dst"),
            },
            0,
            0,
        );

        assert_eq!(request.attempt(&mut state, true), Ok(None));
        assert!(!state.database(0).contains_key(b"dst"));
    }
}
