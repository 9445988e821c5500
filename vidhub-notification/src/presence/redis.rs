use std::collections::HashSet;

use vidhub_shared::clients::redis::RedisClient;

use super::{ConnectionHandle, GroupKey, PresenceError, PresenceRegistry};

const KEY_PREFIX: &str = "vidhub:presence:";

/// Registry shared by every process through Redis sets, one set per group.
/// Redis executes commands on a key one at a time, which gives per-key
/// linearizability.
#[derive(Clone)]
pub struct RedisPresence {
    redis: RedisClient,
}

impl RedisPresence {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

fn set_key(group: &GroupKey) -> String {
    format!("{KEY_PREFIX}{group}")
}

#[axum::async_trait]
impl PresenceRegistry for RedisPresence {
    async fn join(&self, group: &GroupKey, handle: &ConnectionHandle) -> Result<(), PresenceError> {
        self.redis.sadd(&set_key(group), &handle.to_string()).await?;
        Ok(())
    }

    async fn leave(&self, group: &GroupKey, handle: &ConnectionHandle) -> Result<(), PresenceError> {
        self.redis.srem(&set_key(group), &handle.to_string()).await?;
        Ok(())
    }

    async fn members(&self, group: &GroupKey) -> Result<HashSet<ConnectionHandle>, PresenceError> {
        let raw = self.redis.smembers(&set_key(group)).await?;
        Ok(raw
            .iter()
            .filter_map(|member| match member.parse::<ConnectionHandle>() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "skipping malformed presence entry");
                    None
                }
            })
            .collect())
    }
}
