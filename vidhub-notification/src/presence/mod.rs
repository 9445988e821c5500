//! Presence Group Registry: which live connections belong to which delivery
//! group.
//!
//! Each user owns one group (`user_{id}`) shared by all of their open
//! connections. The registry is injected into both the connection session
//! (join/leave) and the delivery channel (members), never reached as global
//! state.

mod local;
mod redis;

pub use local::LocalPresence;
pub use redis::RedisPresence;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Address of every live connection belonging to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn for_user(user_id: Uuid) -> Self {
        Self(format!("user_{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One open connection: the process that owns the socket plus a
/// per-connection id. Unique across every process sharing a broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle {
    pub node_id: String,
    pub connection_id: Uuid,
}

impl ConnectionHandle {
    pub fn new(node_id: impl Into<String>, connection_id: Uuid) -> Self {
        Self {
            node_id: node_id.into(),
            connection_id,
        }
    }
}

/// Wire form is `{node_id}/{connection_id}`; node ids must not contain `/`.
impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.connection_id)
    }
}

impl FromStr for ConnectionHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node_id, connection_id) = s
            .rsplit_once('/')
            .ok_or_else(|| format!("malformed connection handle: {s}"))?;
        let connection_id = Uuid::parse_str(connection_id)
            .map_err(|e| format!("malformed connection id in {s}: {e}"))?;
        Ok(Self::new(node_id, connection_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("presence broker error: {0}")]
    Broker(#[from] ::redis::RedisError),
}

/// Contract shared by every backend:
///
/// - `join` adds a handle; a group may hold any number of handles.
/// - `leave` removes exactly that handle; leaving as a non-member is a no-op.
/// - `members` returns the current membership, possibly empty.
///
/// Operations on the same key are linearizable; nothing is promised across keys.
#[axum::async_trait]
pub trait PresenceRegistry: Send + Sync {
    async fn join(&self, group: &GroupKey, handle: &ConnectionHandle) -> Result<(), PresenceError>;

    async fn leave(&self, group: &GroupKey, handle: &ConnectionHandle) -> Result<(), PresenceError>;

    async fn members(&self, group: &GroupKey) -> Result<HashSet<ConnectionHandle>, PresenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_format() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(GroupKey::for_user(id).as_str(), "user_67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn handle_wire_form_parses_back() {
        let handle = ConnectionHandle::new("node-a", Uuid::new_v4());
        let parsed: ConnectionHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);

        assert!("no-separator".parse::<ConnectionHandle>().is_err());
        assert!("node/not-a-uuid".parse::<ConnectionHandle>().is_err());
    }
}
