//! Command-scoped handles over stored keys.
//!
//! A command takes each key it touches out of the database into a
//! [`CommandItem`], works on it, and hands it back once through
//! [`KeyItems::commit`]. Keys named more than once by the same command share
//! a single item, so `RPOPLPUSH l l` sees its own pop.

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;

use crate::commands::command_error::CommandError;
use crate::key_value_store::{ClientId, Database, Item, Value, ValueKind};
use crate::sorted_set::SortedSet;

/// Index of a resolved key inside a [`KeyItems`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRef(usize);

#[derive(Debug)]
pub struct CommandItem {
    key: Bytes,
    value: Option<Value>,
    expire_at: Option<f64>,
    modified: bool,
}

macro_rules! collection_accessor {
    ($name:ident, $variant:ident, $kind:ident, $type:ty) => {
        /// Borrows the value as this kind, materializing an empty container
        /// when the key is absent. Fails with WRONGTYPE on any other kind.
        pub fn $name(&mut self) -> Result<&mut $type, CommandError> {
            let value = self.value.get_or_insert_with(|| ValueKind::$kind.empty_value());
            match value {
                Value::$variant(inner) => Ok(inner),
                _ => Err(CommandError::WrongType),
            }
        }
    };
}

impl CommandItem {
    fn new(key: Bytes, item: Option<Item>) -> Self {
        let (value, expire_at) = match item {
            Some(item) => (Some(item.value), item.expire_at),
            None => (None, None),
        };
        CommandItem {
            key,
            value,
            expire_at,
            modified: false,
        }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.value
            .as_ref()
            .filter(|value| !value.is_empty_collection())
            .map(Value::kind)
    }

    /// True when the key holds a value: any string, or a non-empty collection.
    pub fn exists(&self) -> bool {
        self.kind().is_some()
    }

    pub fn expire_at(&self) -> Option<f64> {
        self.expire_at
    }

    /// Replaces the value and clears any expiry.
    pub fn set_value(&mut self, value: Value) {
        self.value = Some(value);
        self.expire_at = None;
        self.modified = true;
    }

    /// Replaces the value, keeping the current expiry.
    pub fn update(&mut self, value: Value) {
        self.value = Some(value);
        self.modified = true;
    }

    /// Removes the key.
    pub fn delete(&mut self) {
        self.value = None;
        self.expire_at = None;
        self.modified = true;
    }

    /// Takes the value out, leaving the key deleted.
    pub fn take_value(&mut self) -> Option<Value> {
        let value = self.value.take().filter(|value| !value.is_empty_collection());
        self.expire_at = None;
        self.modified = true;
        value
    }

    pub fn set_expire_at(&mut self, expire_at: Option<f64>) {
        self.expire_at = expire_at;
        self.modified = true;
    }

    /// Marks an in-place mutation through one of the typed accessors.
    pub fn mark_updated(&mut self) {
        self.modified = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The string value, `None` when absent.
    pub fn as_string(&self) -> Result<Option<&Bytes>, CommandError> {
        match &self.value {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(value) if value.is_empty_collection() => Ok(None),
            Some(_) => Err(CommandError::WrongType),
        }
    }

    collection_accessor!(as_list, List, List, VecDeque<Bytes>);
    collection_accessor!(as_set, Set, Set, HashSet<Bytes>);
    collection_accessor!(as_hash, Hash, Hash, HashMap<Bytes, Bytes>);
    collection_accessor!(as_zset, ZSet, ZSet, SortedSet);

    fn write_back(self, db: &mut Database) -> Option<Bytes> {
        let CommandItem {
            key,
            value,
            expire_at,
            modified,
        } = self;
        let value = value.filter(|value| !value.is_empty_collection());
        if let Some(value) = value {
            db.set(key.clone(), Item { value, expire_at });
        }
        modified.then_some(key)
    }
}

/// The keys resolved for one command, deduplicated by name.
#[derive(Debug, Default)]
pub struct KeyItems {
    items: Vec<CommandItem>,
}

impl KeyItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, key: &[u8]) -> Option<KeyRef> {
        self.items
            .iter()
            .position(|item| item.key.as_ref() == key)
            .map(KeyRef)
    }

    /// Returns the handle for `key`, taking it out of `db` on first use.
    pub fn resolve(&mut self, db: &mut Database, key: &Bytes) -> KeyRef {
        if let Some(existing) = self.find(key) {
            return existing;
        }
        let item = db.take(key);
        self.items.push(CommandItem::new(key.clone(), item));
        KeyRef(self.items.len() - 1)
    }

    pub fn get(&self, key: KeyRef) -> &CommandItem {
        &self.items[key.0]
    }

    pub fn get_mut(&mut self, key: KeyRef) -> &mut CommandItem {
        &mut self.items[key.0]
    }

    /// Mutable access to two distinct items at once.
    pub fn pair_mut(&mut self, first: KeyRef, second: KeyRef) -> Option<(&mut CommandItem, &mut CommandItem)> {
        if first.0 == second.0 {
            return None;
        }
        if first.0 < second.0 {
            let (head, tail) = self.items.split_at_mut(second.0);
            Some((&mut head[first.0], &mut tail[0]))
        } else {
            let (head, tail) = self.items.split_at_mut(first.0);
            Some((&mut tail[0], &mut head[second.0]))
        }
    }

    /// Writes every item back to `db` and notifies watchers of modified keys.
    /// Returns the clients whose watches were invalidated.
    pub fn commit(self, db: &mut Database) -> Vec<ClientId> {
        let mut invalidated = Vec::new();
        for item in self.items {
            if let Some(key) = item.write_back(db) {
                invalidated.extend(db.notify(&key));
            }
        }
        invalidated
    }

    /// Puts every item back untouched after a failed command.
    pub fn restore(self, db: &mut Database) {
        for mut item in self.items {
            item.modified = false;
            item.write_back(db);
        }
    }
}
