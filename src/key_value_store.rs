//! The keyspace: values, items with expiry, and per-database stores.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar};

use bytes::Bytes;
use tokio::sync::Notify;

use crate::sorted_set::SortedSet;

/// Identifies one client connection attached to a server.
pub type ClientId = u64;

/// Kind of value held by a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
    Set,
    Hash,
    ZSet,
}

impl ValueKind {
    /// Name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Set => "set",
            ValueKind::Hash => "hash",
            ValueKind::ZSet => "zset",
        }
    }

    /// An empty container of this kind.
    pub fn empty_value(&self) -> Value {
        match self {
            ValueKind::String => Value::String(Bytes::new()),
            ValueKind::List => Value::List(VecDeque::new()),
            ValueKind::Set => Value::Set(HashSet::new()),
            ValueKind::Hash => Value::Hash(HashMap::new()),
            ValueKind::ZSet => Value::ZSet(SortedSet::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    ZSet(SortedSet),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Hash(_) => ValueKind::Hash,
            Value::ZSet(_) => ValueKind::ZSet,
        }
    }

    /// Collections are empty when they hold no elements. Strings never are,
    /// so an empty string is still a stored key.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::ZSet(zset) => zset.is_empty(),
        }
    }
}

/// A stored value plus its absolute expiry, in seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub value: Value,
    pub expire_at: Option<f64>,
}

impl Item {
    pub fn new(value: Value) -> Self {
        Item {
            value,
            expire_at: None,
        }
    }

    pub fn is_expired(&self, now: f64) -> bool {
        matches!(self.expire_at, Some(expire_at) if expire_at <= now)
    }
}

/// One logical database.
///
/// The `time` field is the virtual clock, advanced by the dispatcher once per
/// command, so every expiry check inside a command agrees on "now".
#[derive(Debug)]
pub struct Database {
    data: HashMap<Bytes, Item>,
    pub time: f64,
    watches: HashMap<Bytes, HashSet<ClientId>>,
    condition: Arc<Condvar>,
    change_listeners: HashMap<u64, Arc<Notify>>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Database {
            data: HashMap::new(),
            time: 0.0,
            watches: HashMap::new(),
            condition: Arc::new(Condvar::new()),
            change_listeners: HashMap::new(),
        }
    }

    /// Looks up a live item, deleting it first if it has expired.
    pub fn get(&mut self, key: &[u8]) -> Option<&Item> {
        self.purge_if_expired(key);
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Item> {
        self.purge_if_expired(key);
        self.data.get_mut(key)
    }

    /// Removes a live item from the store and hands over ownership.
    pub fn take(&mut self, key: &[u8]) -> Option<Item> {
        self.purge_if_expired(key);
        self.data.remove(key)
    }

    /// Returns the value for `key`, or an empty container of `kind` that is
    /// not persisted until someone stores it back.
    pub fn get_or_default(&mut self, key: &[u8], kind: ValueKind) -> Item {
        match self.get(key) {
            Some(item) => item.clone(),
            None => Item::new(kind.empty_value()),
        }
    }

    pub fn contains_key(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: Bytes, item: Item) {
        self.data.insert(key, item);
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<Item> {
        self.take(key)
    }

    /// Sets the absolute expiry of an existing key.
    pub fn expire_at(&mut self, key: &[u8], expire_at: f64) -> bool {
        match self.get_mut(key) {
            Some(item) => {
                item.expire_at = Some(expire_at);
                true
            }
            None => false,
        }
    }

    /// Removes the expiry of an existing key, returning whether it had one.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        match self.get_mut(key) {
            Some(item) => item.expire_at.take().is_some(),
            None => false,
        }
    }

    /// Live keys, with expired entries purged first.
    pub fn iter_keys(&mut self) -> Vec<Bytes> {
        self.purge_expired();
        self.data.keys().cloned().collect()
    }

    pub fn len(&mut self) -> usize {
        self.purge_expired();
        self.data.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Deletes every key, notifying watchers of each one.
    pub fn clear(&mut self) -> Vec<ClientId> {
        self.purge_expired();
        let keys: Vec<Bytes> = self.data.keys().cloned().collect();
        let mut invalidated = Vec::new();
        for key in &keys {
            invalidated.extend(self.notify(key));
        }
        self.data.clear();
        invalidated
    }

    /// Exchanges contents and clocks with another database. Watchers and
    /// waiters stay attached to their database index.
    pub fn swap(&mut self, other: &mut Database) {
        std::mem::swap(&mut self.data, &mut other.data);
        std::mem::swap(&mut self.time, &mut other.time);
    }

    /// Registers `client` as a watcher of `key`.
    pub fn watch(&mut self, key: Bytes, client: ClientId) {
        self.watches.entry(key).or_default().insert(client);
    }

    pub fn unwatch(&mut self, key: &[u8], client: ClientId) {
        if let Some(watchers) = self.watches.get_mut(key) {
            watchers.remove(&client);
            if watchers.is_empty() {
                self.watches.remove(key);
            }
        }
    }

    /// Signals a modification of `key`: wakes blocked waiters and returns the
    /// clients whose watch on `key` is now invalidated.
    pub fn notify(&mut self, key: &[u8]) -> Vec<ClientId> {
        self.condition.notify_all();
        for listener in self.change_listeners.values() {
            listener.notify_one();
        }
        self.watches
            .get(key)
            .map(|watchers| watchers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Condition variable used by synchronous blocking waiters.
    pub fn condition(&self) -> Arc<Condvar> {
        Arc::clone(&self.condition)
    }

    pub fn add_change_listener(&mut self, id: u64, listener: Arc<Notify>) {
        self.change_listeners.insert(id, listener);
    }

    pub fn remove_change_listener(&mut self, id: u64) {
        self.change_listeners.remove(&id);
    }

    pub fn change_listener_count(&self) -> usize {
        self.change_listeners.len()
    }

    fn purge_if_expired(&mut self, key: &[u8]) {
        let now = self.time;
        if matches!(self.data.get(key), Some(item) if item.is_expired(now)) {
            self.data.remove(key);
        }
    }

    fn purge_expired(&mut self) {
        let now = self.time;
        self.data.retain(|_, item| !item.is_expired(now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_item(value: &'static str, expire_at: Option<f64>) -> Item {
        Item {
            value: Value::String(Bytes::from_static(value.as_bytes())),
            expire_at,
        }
    }

    #[test]
    fn test_expired_keys_are_purged_lazily() {
        let mut db = Database::new();
        db.time = 100.0;
        db.set(Bytes::from_static(b"live"), string_item("a", Some(200.0)));
        db.set(Bytes::from_static(b"dead"), string_item("b", Some(100.0)));
        db.set(Bytes::from_static(b"forever"), string_item("c", None));

        assert!(db.get(b"live").is_some());
        assert!(db.get(b"dead").is_none());
        assert_eq!(db.len(), 2);

        db.time = 250.0;
        let mut keys = db.iter_keys();
        keys.sort();
        assert_eq!(keys, vec![Bytes::from_static(b"forever")]);
    }

    #[test]
    fn test_get_or_default_does_not_persist() {
        let mut db = Database::new();
        let item = db.get_or_default(b"list", ValueKind::List);

        assert_eq!(item.value, Value::List(VecDeque::new()));
        assert!(!db.contains_key(b"list"));
    }

    #[test]
    fn test_notify_reports_watchers() {
        let mut db = Database::new();
        db.watch(Bytes::from_static(b"k"), 7);
        db.watch(Bytes::from_static(b"k"), 8);
        db.unwatch(b"k", 8);

        assert_eq!(db.notify(b"k"), vec![7]);
        assert!(db.notify(b"other").is_empty());
    }

    #[test]
    fn test_persist_and_expire_at() {
        let mut db = Database::new();
        db.set(Bytes::from_static(b"k"), string_item("v", None));

        assert!(!db.persist(b"k"));
        assert!(db.expire_at(b"k", 50.0));
        assert!(db.persist(b"k"));
        assert!(!db.expire_at(b"missing", 50.0));
    }
}
