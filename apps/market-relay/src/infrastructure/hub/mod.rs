//! Symbol Group Hub
//!
//! Tracks websocket connections and the symbol groups they joined, and
//! delivers relayed updates to group members only.
//!
//! Each connection owns a bounded outbound queue drained by its socket
//! writer task. Publishing uses `try_send`, so one stalled browser tab
//! loses updates instead of holding up the relay loop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::TickerSink;
use crate::domain::{TickerPayload, group_key};
use crate::infrastructure::protocol::ServerEvent;

/// Default outbound queue bound per connection.
pub const DEFAULT_CLIENT_CAPACITY: usize = 256;

// =============================================================================
// Connection Identity
// =============================================================================

/// Identity of one websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Rejected hub operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Join or leave with an empty symbol.
    #[error("symbol must not be blank")]
    BlankSymbol,

    /// Connection is not registered.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

// =============================================================================
// Hub
// =============================================================================

/// Connection and group registry.
#[derive(Debug)]
pub struct GroupHub {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    groups: DashMap<String, DashSet<ConnectionId>>,
    latest: DashMap<String, TickerPayload>,
    next_id: AtomicU64,
    capacity: usize,
}

impl GroupHub {
    /// Create a hub whose connections queue up to `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            groups: DashMap::new(),
            latest: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        })
    }

    /// Register a connection and return the receiving end of its queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        self.connections.insert(id, tx);
        tracing::debug!(connection = %id, "hub connection registered");
        (id, rx)
    }

    /// Add a connection to the group for `symbol`.
    ///
    /// Returns the normalized group name.
    ///
    /// # Errors
    ///
    /// [`HubError::BlankSymbol`] for an empty symbol,
    /// [`HubError::UnknownConnection`] if `id` is not registered.
    pub fn join(&self, id: ConnectionId, symbol: &str) -> Result<String, HubError> {
        let group = group_key(symbol).ok_or(HubError::BlankSymbol)?;
        if !self.connections.contains_key(&id) {
            return Err(HubError::UnknownConnection(id));
        }
        self.groups.entry(group.clone()).or_default().insert(id);
        // Pruned by a concurrent publish between the check and the insert
        if !self.connections.contains_key(&id) {
            self.leave_group(id, &group);
            return Err(HubError::UnknownConnection(id));
        }
        tracing::debug!(connection = %id, group = %group, "joined group");
        Ok(group)
    }

    /// Remove a connection from the group for `symbol`.
    ///
    /// Leaving a group that was never joined succeeds.
    ///
    /// # Errors
    ///
    /// [`HubError::BlankSymbol`] for an empty symbol.
    pub fn leave(&self, id: ConnectionId, symbol: &str) -> Result<String, HubError> {
        let group = group_key(symbol).ok_or(HubError::BlankSymbol)?;
        self.leave_group(id, &group);
        tracing::debug!(connection = %id, group = %group, "left group");
        Ok(group)
    }

    fn leave_group(&self, id: ConnectionId, group: &str) {
        if let Some(members) = self.groups.get(group) {
            members.remove(&id);
        }
        self.groups.remove_if(group, |_, members| members.is_empty());
    }

    /// Drop a connection and its membership in every group.
    ///
    /// Groups are swept even when the connection was already removed, so a
    /// membership added after an earlier removal does not linger.
    pub fn remove_connection(&self, id: ConnectionId) {
        let registered = self.connections.remove(&id).is_some();
        self.groups.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        if registered {
            tracing::debug!(connection = %id, "hub connection removed");
        }
    }

    /// Queue an event for one connection.
    ///
    /// Returns `false` if the connection is gone or its queue is full.
    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) -> bool {
        let Ok(text) = event.to_json() else {
            return false;
        };
        self.connections
            .get(&id)
            .is_some_and(|tx| tx.try_send(text).is_ok())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of groups with at least one member.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of members in a group.
    #[must_use]
    pub fn member_count(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }

    /// Most recent update per symbol, sorted by symbol.
    #[must_use]
    pub fn latest_tickers(&self) -> Vec<TickerPayload> {
        let mut tickers: Vec<TickerPayload> =
            self.latest.iter().map(|entry| entry.value().clone()).collect();
        tickers.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tickers
    }
}

impl TickerSink for GroupHub {
    fn publish(&self, group: &str, payload: &TickerPayload) -> usize {
        self.latest.insert(group.to_string(), payload.clone());

        let members: Vec<ConnectionId> = match self.groups.get(group) {
            Some(members) => members.iter().map(|id| *id).collect(),
            None => return 0,
        };

        let event = ServerEvent::TickerUpdate {
            data: payload.clone(),
        };
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(group, error = %e, "failed to encode ticker update");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for id in members {
            let Some(tx) = self.connections.get(&id) else {
                continue;
            };
            match tx.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(connection = %id, group, "client queue full, update dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.remove_connection(id);
        }

        delivered
    }
}

// =============================================================================
// Tests
// =============================================================================
