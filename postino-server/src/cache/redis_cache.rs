use async_trait::async_trait;
use postino_core::{utils::to_unix_micros, MessageSummary};
use redis::aio::MultiplexedConnection;
use std::time::Duration;

use super::{CacheError, RecencyCache};

/// Recency cache kept in Redis, one sorted set per recipient.
///
/// Members are JSON encoded summaries scored by their timestamp in
/// microseconds, so the set is ordered by time whatever the arrival order.
/// Insert, trim and expire run inside one MULTI/EXEC block.
pub struct RedisCache {
    conn: MultiplexedConnection,
    capacity: usize,
    ttl: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, capacity: usize, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            capacity: capacity.max(1),
            ttl,
        })
    }

    fn key(recipient_id: &str) -> String {
        format!("recent:{recipient_id}")
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl RecencyCache for RedisCache {
    async fn push(&self, recipient_id: &str, summary: MessageSummary) -> Result<(), CacheError> {
        let key = Self::key(recipient_id);
        let score = to_unix_micros(summary.timestamp) as f64;
        let member = serde_json::to_string(&summary)?;
        // keep ranks [-capacity, -1], i.e. the `capacity` highest scores
        let keep_from = -(self.capacity as i64) - 1;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(score)
            .arg(member)
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&key)
            .arg(0)
            .arg(keep_from)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn read(&self, recipient_id: &str) -> Result<Vec<MessageSummary>, CacheError> {
        let key = Self::key(recipient_id);
        let mut conn = self.conn.clone();
        let (members,): (Vec<String>,) = redis::pipe()
            .atomic()
            .cmd("ZREVRANGE")
            .arg(&key)
            .arg(0)
            .arg(-1)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        members
            .iter()
            .map(|m| serde_json::from_str(m).map_err(CacheError::from))
            .collect()
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }
}
