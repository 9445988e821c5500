use redis::aio::{ConnectionManager, PubSub};
use redis::AsyncCommands;

/// Thin async wrapper over a multiplexed Redis connection.
///
/// Commands go through a shared `ConnectionManager` (reconnects on its own);
/// pub/sub needs a dedicated connection, opened on demand by [`pubsub`].
///
/// [`pubsub`]: RedisClient::pubsub
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(redis = %redacted(url), "connected to Redis");
        Ok(Self { client, conn })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await
    }

    /// `SET key value EX ttl_secs`.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await
    }

    /// Publish on a pub/sub channel; returns how many subscribers received it.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<i64, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.publish(channel, payload).await
    }

    /// Open a dedicated pub/sub connection.
    pub async fn pubsub(&self) -> Result<PubSub, redis::RedisError> {
        let conn = self.client.get_async_connection().await?;
        Ok(conn.into_pubsub())
    }
}

/// Drop credentials from a connection URL before it reaches the logs.
fn redacted(url: &str) -> String {
    let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
    let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    if scheme.is_empty() {
        host.to_string()
    } else {
        format!("{scheme}://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_not_logged() {
        assert_eq!(redacted("redis://:s3cret@cache.internal:6379/0"), "redis://cache.internal:6379/0");
        assert_eq!(redacted("rediss://app:pw@cache:6380"), "rediss://cache:6380");
        assert_eq!(redacted("redis://localhost:6379/0"), "redis://localhost:6379/0");
    }
}
