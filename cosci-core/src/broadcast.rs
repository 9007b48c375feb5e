//! Progress event fan-out to subscribed connections.
//!
//! A connection subscribes either to one session or to everything
//! ("general"). Each publish reaches every matching connection exactly
//! once. A connection whose receiver has gone away is dropped silently
//! after the delivery pass.
//!
//! # Example
//!
//! ```ignore
//! use cosci_core::broadcast::{ConnectionHandle, EventBroadcaster};
//!
//! let broadcaster = EventBroadcaster::new();
//! let (handle, mut rx) = ConnectionHandle::channel();
//! broadcaster.subscribe(handle, Some("session-1".into())).await;
//!
//! while let Some(message) = rx.recv().await {
//!     println!("{}", serde_json::to_string(&message)?);
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Session lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    IterationStart,
    IterationComplete,
    SessionCompleted,
    SessionCancelled,
    SessionError,
    ResearchStarted,
    ResearchCompleted,
    ResearchError,
    CancelRequested,
}

impl SessionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IterationStart => "iteration_start",
            Self::IterationComplete => "iteration_complete",
            Self::SessionCompleted => "session_completed",
            Self::SessionCancelled => "session_cancelled",
            Self::SessionError => "session_error",
            Self::ResearchStarted => "research_started",
            Self::ResearchCompleted => "research_completed",
            Self::ResearchError => "research_error",
            Self::CancelRequested => "cancel_requested",
        }
    }
}

impl std::fmt::Display for SessionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of one agent within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Completed,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Message delivered to subscribers.
///
/// Serializes as `{"type": "session_update", ...}` or
/// `{"type": "agent_update", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    SessionUpdate {
        session_id: String,
        event_type: SessionEventType,
        data: Value,
        timestamp: DateTime<Utc>,
    },
    AgentUpdate {
        session_id: String,
        agent: String,
        status: AgentStatus,
        data: Value,
        timestamp: DateTime<Utc>,
    },
}

impl BroadcastMessage {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionUpdate { session_id, .. } | Self::AgentUpdate { session_id, .. } => {
                session_id
            }
        }
    }
}

/// Identifier of a subscribed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
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

/// Sending half of a subscriber connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: mpsc::UnboundedSender<BroadcastMessage>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<BroadcastMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    /// Create a handle and the receiver its messages arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BroadcastMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn send(&self, message: BroadcastMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

struct Subscription {
    handle: ConnectionHandle,
    /// `None` receives every session's events
    session: Option<String>,
}

/// Counts of current subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub general_connections: usize,
    pub session_connections: BTreeMap<String, usize>,
}

/// Registry of subscribed connections.
#[derive(Default)]
pub struct EventBroadcaster {
    subscriptions: RwLock<HashMap<ConnectionId, Subscription>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any earlier registration.
    pub async fn subscribe(&self, handle: ConnectionHandle, session_id: Option<String>) {
        debug!(connection = %handle.id, session = ?session_id, "Connection subscribed");
        self.subscriptions.write().await.insert(
            handle.id,
            Subscription {
                handle,
                session: session_id,
            },
        );
    }

    /// Remove a connection. Returns whether it was registered.
    pub async fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = self.subscriptions.write().await.remove(&id).is_some();
        if removed {
            debug!(connection = %id, "Connection unsubscribed");
        }
        removed
    }

    /// Publish a session lifecycle event. Returns the delivery count.
    pub async fn publish_session_update(
        &self,
        session_id: &str,
        event_type: SessionEventType,
        data: Value,
    ) -> usize {
        self.publish(BroadcastMessage::SessionUpdate {
            session_id: session_id.to_string(),
            event_type,
            data,
            timestamp: Utc::now(),
        })
        .await
    }

    /// Publish an agent progress event. Returns the delivery count.
    pub async fn publish_agent_update(
        &self,
        session_id: &str,
        agent: &str,
        status: AgentStatus,
        data: Value,
    ) -> usize {
        self.publish(BroadcastMessage::AgentUpdate {
            session_id: session_id.to_string(),
            agent: agent.to_string(),
            status,
            data,
            timestamp: Utc::now(),
        })
        .await
    }

    /// Deliver to every general connection and every connection subscribed
    /// to the message's session.
    pub async fn publish(&self, message: BroadcastMessage) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscriptions = self.subscriptions.read().await;
            for (id, sub) in subscriptions.iter() {
                let matches = sub
                    .session
                    .as_deref()
                    .map_or(true, |s| s == message.session_id());
                if !matches {
                    continue;
                }
                if sub.handle.send(message.clone()) {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut subscriptions = self.subscriptions.write().await;
            for id in &closed {
                subscriptions.remove(id);
            }
            debug!(removed = closed.len(), "Dropped closed connections");
        }
        delivered
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        let subscriptions = self.subscriptions.read().await;
        let mut stats = ConnectionStats {
            total_connections: subscriptions.len(),
            ..Default::default()
        };
        for sub in subscriptions.values() {
            match &sub.session {
                Some(session) => *stats.session_connections.entry(session.clone()).or_default() += 1,
                None => stats.general_connections += 1,
            }
        }
        stats
    }
}
