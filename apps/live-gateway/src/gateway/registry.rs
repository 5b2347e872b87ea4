//! Live-connection registry, owned and mutated only by the hub loop.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::auth::Identity;

use super::events::Outbound;

/// A registered connection: its identity and the sending half of its
/// outbound queue. Dropping the last copy closes the queue.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub identity: Identity,
    pub outbound: mpsc::Sender<Outbound>,
}

/// Snapshot entry returned by member queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub connection_id: String,
    pub identity: Identity,
}

impl From<&Connection> for Member {
    fn from(connection: &Connection) -> Self {
        Self {
            connection_id: connection.id.clone(),
            identity: connection.identity,
        }
    }
}

/// Registered connections keyed by id, with a secondary index by identity
/// so fan-out cost follows the recipient list rather than the registry size.
#[derive(Default)]
pub struct Registry {
    connections: HashMap<String, Connection>,
    by_identity: HashMap<Identity, HashSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Returns `false` (and leaves the registry
    /// unchanged) if the id is already present.
    pub fn insert(&mut self, connection: Connection) -> bool {
        if self.connections.contains_key(&connection.id) {
            return false;
        }
        self.by_identity
            .entry(connection.identity)
            .or_default()
            .insert(connection.id.clone());
        self.connections.insert(connection.id.clone(), connection);
        true
    }

    /// Remove a connection, returning it if it was present.
    pub fn remove(&mut self, connection_id: &str) -> Option<Connection> {
        let connection = self.connections.remove(connection_id)?;
        if let Some(ids) = self.by_identity.get_mut(&connection.identity) {
            ids.remove(connection_id);
            if ids.is_empty() {
                self.by_identity.remove(&connection.identity);
            }
        }
        Some(connection)
    }

    pub fn get(&self, connection_id: &str) -> Option<&Connection> {
        self.connections.get(connection_id)
    }

    /// Ids of every connection whose identity appears in `recipients`.
    /// Each connection is listed once even if its identity repeats.
    pub fn matching(&self, recipients: &[Identity]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for identity in recipients {
            if !seen.insert(*identity) {
                continue;
            }
            if let Some(conns) = self.by_identity.get(identity) {
                ids.extend(conns.iter().cloned());
            }
        }
        ids
    }

    pub fn members(&self) -> Vec<Member> {
        self.connections.values().map(Member::from).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every connection, closing all outbound queues.
    pub fn clear(&mut self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        self.by_identity.clear();
        count
    }
}
