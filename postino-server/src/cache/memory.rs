use async_trait::async_trait;
use dashmap::DashMap;
use postino_core::MessageSummary;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::{CacheError, RecencyCache};

struct Window {
    items: VecDeque<MessageSummary>,
    expires_at: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Ordered insert by `(timestamp, message_id)` descending, the same
    /// order the store returns, then trim from the tail. A summary older
    /// than every entry of a full window is not kept at all.
    fn insert(&mut self, summary: MessageSummary, capacity: usize) {
        let key = (summary.timestamp, summary.message_id.as_str());
        let at = self
            .items
            .iter()
            .position(|s| (s.timestamp, s.message_id.as_str()) <= key)
            .unwrap_or(self.items.len());
        if at >= capacity {
            return;
        }
        self.items.insert(at, summary);
        self.items.truncate(capacity);
    }
}

/// In-process recency cache.
///
/// Windows live in a `DashMap`; a push holds the shard lock of its
/// recipient for the whole insert-and-trim, so concurrent sends to the same
/// recipient are serialized while different recipients proceed in parallel.
pub struct MemoryCache {
    windows: DashMap<String, Window>,
    capacity: usize,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Drops every expired window and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    /// Sweeps windows nobody reads anymore, every quarter of the TTL
    /// (between 1s and 10min).
    pub fn spawn_purger(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = (cache.ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(600));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "expired cache windows purged");
                }
            }
        })
    }
}

#[async_trait]
impl RecencyCache for MemoryCache {
    async fn push(&self, recipient_id: &str, summary: MessageSummary) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut window = self
            .windows
            .entry(recipient_id.to_string())
            .or_insert_with(|| Window {
                items: VecDeque::with_capacity(self.capacity),
                expires_at: now + self.ttl,
            });
        if window.is_expired(now) {
            window.items.clear();
        }
        window.expires_at = now + self.ttl;
        window.insert(summary, self.capacity);
        Ok(())
    }

    async fn read(&self, recipient_id: &str) -> Result<Vec<MessageSummary>, CacheError> {
        let now = Instant::now();
        match self.windows.get_mut(recipient_id) {
            None => return Ok(Vec::new()),
            Some(mut window) if !window.is_expired(now) => {
                window.expires_at = now + self.ttl;
                return Ok(window.items.iter().cloned().collect());
            }
            Some(_) => {}
        }
        // expired: the guard is gone, drop the entry unless a push revived it
        self.windows.remove_if(recipient_id, |_, w| w.is_expired(now));
        Ok(Vec::new())
    }
}
