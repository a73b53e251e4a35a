use super::{ExecContext, Storage, effective_expiration};
use crate::error::SchedulerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process [`Storage`]. Clones share the same map.
///
/// Calls honor the bound [`ExecContext`] like the Redis backend does.
/// Expired entries are evicted on every write and whenever a read sees them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ctx: ExecContext,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the same way a connect would when `ctx` is already cancelled or
    /// past its deadline.
    pub async fn connect(ctx: ExecContext) -> Result<Self, SchedulerError> {
        ctx.run(async { Ok::<_, SchedulerError>(()) })
            .await
            .map_err(SchedulerError::connection_failed)?;
        Ok(Self::new().with_context(ctx))
    }

    /// Same map, different execution context.
    pub fn with_context(&self, ctx: ExecContext) -> Self {
        Self {
            entries: self.entries.clone(),
            ctx,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.write().await;
        evict_expired(&mut entries, Instant::now());
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn evict_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
    entries.retain(|_, e| e.is_live(now));
}

/// Look up `key`, removing it if it has expired.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a Entry> {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get(key)
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expiration: Option<Duration>,
    ) -> Result<(), SchedulerError> {
        self.ctx
            .run(async {
                let now = Instant::now();
                let expires_at = effective_expiration(expiration).map(|ttl| now + ttl);
                let mut entries = self.entries.write().await;
                evict_expired(&mut entries, now);
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_string(),
                        expires_at,
                    },
                );
                Ok::<_, SchedulerError>(())
            })
            .await
    }

    async fn get(&self, key: &str) -> Result<String, SchedulerError> {
        self.ctx
            .run(async {
                let mut entries = self.entries.write().await;
                live_entry(&mut entries, key, Instant::now())
                    .map(|e| e.value.clone())
                    .ok_or_else(|| SchedulerError::KeyNotFound(key.to_string()))
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), SchedulerError> {
        self.ctx
            .run(async {
                self.entries.write().await.remove(key);
                Ok::<_, SchedulerError>(())
            })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool, SchedulerError> {
        self.ctx
            .run(async {
                let mut entries = self.entries.write().await;
                Ok::<_, SchedulerError>(live_entry(&mut entries, key, Instant::now()).is_some())
            })
            .await
    }
}
