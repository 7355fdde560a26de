use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Blocks,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Blocks => write!(f, "blocks"),
        }
    }
}

/// Two-way index between connections and the topics they hold. Subscriber
/// sets keep subscription order so fan-out order is stable.
#[derive(Debug, Default)]
pub struct Subscriptions {
    by_topic: HashMap<Topic, IndexSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<Topic>>,
}

impl Subscriptions {
    /// Returns false when the connection already held the topic.
    pub fn subscribe(&mut self, id: ConnectionId, topic: Topic) -> bool {
        let added = self.by_connection.entry(id).or_default().insert(topic);
        if added {
            self.by_topic.entry(topic).or_default().insert(id);
        }
        added
    }

    /// Returns false when the connection did not hold the topic.
    pub fn unsubscribe(&mut self, id: ConnectionId, topic: Topic) -> bool {
        let Some(topics) = self.by_connection.get_mut(&id) else {
            return false;
        };
        if !topics.remove(&topic) {
            return false;
        }
        if topics.is_empty() {
            self.by_connection.remove(&id);
        }
        if let Some(ids) = self.by_topic.get_mut(&topic) {
            ids.shift_remove(&id);
            if ids.is_empty() {
                self.by_topic.remove(&topic);
            }
        }
        true
    }

    pub fn snapshot(&self, topic: Topic) -> Vec<ConnectionId> {
        self.by_topic
            .get(&topic)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn topics(&self, id: ConnectionId) -> HashSet<Topic> {
        self.by_connection.get(&id).cloned().unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.by_topic.get(&topic).map_or(0, |ids| ids.len())
    }

    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }

    /// Drops every subscription of `id` and reports how many were removed.
    /// The two indexes are always cleaned; an error means they disagreed.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<usize, NotifyError> {
        let topics = self.by_connection.remove(&id).unwrap_or_default();
        let mut removed = 0;
        let mut inconsistent: Vec<Topic> = topics
            .iter()
            .filter(|topic| !self.by_topic.contains_key(topic))
            .copied()
            .collect();
        self.by_topic.retain(|topic, ids| {
            let held = ids.shift_remove(&id);
            if held {
                removed += 1;
            }
            if held != topics.contains(topic) {
                inconsistent.push(*topic);
            }
            !ids.is_empty()
        });
        if inconsistent.is_empty() {
            Ok(removed)
        } else {
            Err(NotifyError::RegistryRace(format!(
                "connection {} had mismatched entries for {:?}",
                id, inconsistent
            )))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    subscriptions: Arc<Mutex<Subscriptions>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, id: ConnectionId, topic: Topic) -> bool {
        self.subscriptions.lock().await.subscribe(id, topic)
    }

    pub async fn unsubscribe(&self, id: ConnectionId, topic: Topic) -> bool {
        self.subscriptions.lock().await.unsubscribe(id, topic)
    }

    pub async fn snapshot(&self, topic: Topic) -> Vec<ConnectionId> {
        self.subscriptions.lock().await.snapshot(topic)
    }

    pub async fn topics(&self, id: ConnectionId) -> HashSet<Topic> {
        self.subscriptions.lock().await.topics(id)
    }

    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscriptions.lock().await.subscriber_count(topic)
    }

    pub async fn remove_connection(&self, id: ConnectionId) -> Result<usize, NotifyError> {
        self.subscriptions.lock().await.remove_connection(id)
    }

    /// Holds off every subscribe and unsubscribe until the guard drops.
    pub async fn lock(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions.lock().await
    }
}
