//! Registry of live WebSocket connections.
//!
//! Each connection owns a bounded outbound queue drained by exactly one
//! writer task. The registry keeps the sending half together with the
//! connection's recipient context so the hub can route events without
//! touching sockets.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::domain::events::EventRoute;
use crate::domain::foundation::AuthenticatedUser;

use super::messages::Envelope;

/// Server-assigned connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, greeting not yet queued. Not routable.
    Connecting,
    Open,
    /// Teardown started; no new events are routed.
    Closing,
    Closed,
}

#[derive(Debug)]
struct ConnectionHandle {
    user: AuthenticatedUser,
    outbound: mpsc::Sender<Envelope>,
    state: ConnectionState,
}

impl ConnectionHandle {
    fn matches(&self, route: &EventRoute) -> bool {
        match route {
            EventRoute::Broadcast => true,
            EventRoute::Organization(org) => self.user.organization_id == *org,
            EventRoute::User(user) => self.user.id == *user,
        }
    }
}

/// Result of registering a new connection.
pub struct Registration {
    pub id: ConnectionId,
    /// Sending half, for replies from the connection's own reader.
    pub outbound: mpsc::Sender<Envelope>,
    /// Receiving half, owned by the connection's writer task.
    pub queue: mpsc::Receiver<Envelope>,
}

/// A routable connection and its queue.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: ConnectionId,
    pub outbound: mpsc::Sender<Envelope>,
}

/// Concurrency-safe map of connection id to handle.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// # Arguments
    ///
    /// * `queue_capacity` - Outbound frames buffered per connection before
    ///   the hub starts dropping events for it.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub async fn register(&self, user: AuthenticatedUser) -> Registration {
        let (outbound, queue) = mpsc::channel(self.queue_capacity);
        let id = ConnectionId::new();
        self.connections.write().await.insert(
            id,
            ConnectionHandle {
                user,
                outbound: outbound.clone(),
                state: ConnectionState::Connecting,
            },
        );
        Registration { id, outbound, queue }
    }

    /// Makes the connection routable. Returns false if it is already gone.
    pub async fn mark_open(&self, id: ConnectionId) -> bool {
        self.transition(id, ConnectionState::Open).await
    }

    pub async fn mark_closing(&self, id: ConnectionId) -> bool {
        self.transition(id, ConnectionState::Closing).await
    }

    async fn transition(&self, id: ConnectionId, state: ConnectionState) -> bool {
        match self.connections.write().await.get_mut(&id) {
            Some(handle) => {
                handle.state = state;
                true
            }
            None => false,
        }
    }

    /// Removes the connection. Returns true only for the call that
    /// actually removed it.
    pub async fn deregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);
        match removed {
            Some(handle) => {
                tracing::debug!(connection_id = %id, user_id = %handle.user.id, "Connection deregistered");
                true
            }
            None => false,
        }
    }

    /// Open connections the route addresses.
    pub async fn targets(&self, route: &EventRoute) -> Vec<Target> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, h)| h.state == ConnectionState::Open && h.matches(route))
            .map(|(id, h)| Target {
                id: *id,
                outbound: h.outbound.clone(),
            })
            .collect()
    }

    /// Current lifecycle state; `Closed` once deregistered.
    pub async fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections
            .read()
            .await
            .get(&id)
            .map_or(ConnectionState::Closed, |h| h.state)
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}
