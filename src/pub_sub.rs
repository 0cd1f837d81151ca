//! Pub/sub subscription registry.
//!
//! Maps exact channels and glob patterns to the connections subscribed to
//! them. Connections are referenced by id and removed explicitly when they
//! unsubscribe or disconnect.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::commands::CommandError;
use crate::glob::GlobPattern;
use crate::key_value_store::ClientId;
use crate::resp::RespValue;

#[derive(Debug)]
struct PatternSubscription {
    pattern: GlobPattern,
    subscribers: HashSet<ClientId>,
}

#[derive(Debug, Default)]
pub struct PubSubRegistry {
    channels: HashMap<Bytes, HashSet<ClientId>>,
    patterns: HashMap<Bytes, PatternSubscription>,
}

impl PubSubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `client` to `channel`. Returns false if it was already there.
    pub fn subscribe(&mut self, client: ClientId, channel: Bytes) -> bool {
        self.channels.entry(channel).or_default().insert(client)
    }

    pub fn unsubscribe(&mut self, client: ClientId, channel: &[u8]) -> bool {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return false;
        };
        let removed = subscribers.remove(&client);
        if subscribers.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    /// Adds `client` to `pattern`, compiling it on first use.
    pub fn psubscribe(&mut self, client: ClientId, pattern: Bytes) -> Result<bool, CommandError> {
        if let Some(subscription) = self.patterns.get_mut(&pattern) {
            return Ok(subscription.subscribers.insert(client));
        }
        let compiled = GlobPattern::compile(&pattern)?;
        self.patterns.insert(
            pattern,
            PatternSubscription {
                pattern: compiled,
                subscribers: HashSet::from([client]),
            },
        );
        Ok(true)
    }

    pub fn punsubscribe(&mut self, client: ClientId, pattern: &[u8]) -> bool {
        let Some(subscription) = self.patterns.get_mut(pattern) else {
            return false;
        };
        let removed = subscription.subscribers.remove(&client);
        if subscription.subscribers.is_empty() {
            self.patterns.remove(pattern);
        }
        removed
    }

    /// Channels `client` is subscribed to.
    pub fn channels_of(&self, client: ClientId) -> Vec<Bytes> {
        self.channels
            .iter()
            .filter(|(_, subscribers)| subscribers.contains(&client))
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    /// Patterns `client` is subscribed to.
    pub fn patterns_of(&self, client: ClientId) -> Vec<Bytes> {
        self.patterns
            .iter()
            .filter(|(_, subscription)| subscription.subscribers.contains(&client))
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    /// Drops every subscription held by `client`.
    pub fn remove_client(&mut self, client: ClientId) {
        self.channels.retain(|_, subscribers| {
            subscribers.remove(&client);
            !subscribers.is_empty()
        });
        self.patterns.retain(|_, subscription| {
            subscription.subscribers.remove(&client);
            !subscription.subscribers.is_empty()
        });
    }

    /// Builds one delivery per matching subscription: a `message` for each
    /// exact subscriber and a `pmessage` for each matching pattern subscriber.
    pub fn deliveries(&self, channel: &Bytes, message: &Bytes) -> Vec<(ClientId, RespValue)> {
        let mut deliveries = Vec::new();

        if let Some(subscribers) = self.channels.get(channel) {
            let payload = RespValue::bulk_array([
                Bytes::from_static(b"message"),
                channel.clone(),
                message.clone(),
            ]);
            deliveries.extend(subscribers.iter().map(|client| (*client, payload.clone())));
        }

        for (pattern, subscription) in &self.patterns {
            if !subscription.pattern.matches(channel) {
                continue;
            }
            let payload = RespValue::bulk_array([
                Bytes::from_static(b"pmessage"),
                pattern.clone(),
                channel.clone(),
                message.clone(),
            ]);
            deliveries.extend(
                subscription
                    .subscribers
                    .iter()
                    .map(|client| (*client, payload.clone())),
            );
        }

        deliveries
    }
}
