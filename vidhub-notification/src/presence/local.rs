use std::collections::HashSet;

use dashmap::DashMap;

use super::{ConnectionHandle, GroupKey, PresenceError, PresenceRegistry};

/// In-process registry for single-instance deployments. Per-key updates are
/// serialized by the map's shard locks; empty groups are dropped.
#[derive(Default)]
pub struct LocalPresence {
    groups: DashMap<GroupKey, HashSet<ConnectionHandle>>,
}

impl LocalPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups with at least one member.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[axum::async_trait]
impl PresenceRegistry for LocalPresence {
    async fn join(&self, group: &GroupKey, handle: &ConnectionHandle) -> Result<(), PresenceError> {
        self.groups
            .entry(group.clone())
            .or_default()
            .insert(handle.clone());
        Ok(())
    }

    async fn leave(&self, group: &GroupKey, handle: &ConnectionHandle) -> Result<(), PresenceError> {
        self.groups.remove_if_mut(group, |_, members| {
            members.remove(handle);
            members.is_empty()
        });
        Ok(())
    }

    async fn members(&self, group: &GroupKey) -> Result<HashSet<ConnectionHandle>, PresenceError> {
        Ok(self
            .groups
            .get(group)
            .map(|members| members.clone())
            .unwrap_or_default())
    }
}
