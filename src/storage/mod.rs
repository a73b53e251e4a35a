//! Key-value storage behind a narrow capability trait.
//!
//! Layout:
//! - `context.rs`: `ExecContext`, deadline + cancellation for store calls
//! - `redis.rs`: `RedisStorage`, the networked backend
//! - `memory.rs`: `MemoryStorage`, an in-process backend for tests and local runs

pub mod context;
pub mod memory;
pub mod redis;

pub use context::ExecContext;
pub use memory::MemoryStorage;
pub use self::redis::RedisStorage;

use crate::config::StoreSettings;
use crate::error::SchedulerError;
use async_trait::async_trait;
use std::time::Duration;

/// Scheme selecting [`MemoryStorage`] in [`connect`].
pub const MEMORY_SCHEME: &str = "memory";

/// Set/get/delete/exists over string keys and values.
///
/// Every call is a single round trip; failures are returned as-is, with
/// no retry. `get` on an absent key yields [`SchedulerError::KeyNotFound`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `value` under `key`. `None` or a zero duration means no expiry.
    async fn set(
        &self,
        key: &str,
        value: &str,
        expiration: Option<Duration>,
    ) -> Result<(), SchedulerError>;

    async fn get(&self, key: &str) -> Result<String, SchedulerError>;

    async fn delete(&self, key: &str) -> Result<(), SchedulerError>;

    /// True iff exactly one matching key exists.
    async fn exists(&self, key: &str) -> Result<bool, SchedulerError>;
}

/// Storage backend chosen at construction time.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    Redis(RedisStorage),
    Memory(MemoryStorage),
}

impl StorageBackend {
    /// Same backend and connection, different execution context.
    pub fn with_context(&self, ctx: ExecContext) -> Self {
        match self {
            Self::Redis(s) => Self::Redis(s.with_context(ctx)),
            Self::Memory(s) => Self::Memory(s.with_context(ctx)),
        }
    }
}

/// Build the backend named by `settings.url` and verify it is usable.
///
/// `memory://` selects the in-process store; any other url goes to Redis.
/// Connecting is bounded by `settings.timeout`; the handle's calls run
/// under `ctx`.
pub async fn connect(
    settings: &StoreSettings,
    ctx: ExecContext,
) -> Result<StorageBackend, SchedulerError> {
    if is_memory_url(&settings.url) {
        return MemoryStorage::connect(ctx).await.map(StorageBackend::Memory);
    }
    RedisStorage::connect(settings, ctx)
        .await
        .map(StorageBackend::Redis)
}

fn is_memory_url(url: &str) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(MEMORY_SCHEME))
}

/// Zero means "no expiry", same as `None`.
pub(crate) fn effective_expiration(expiration: Option<Duration>) -> Option<Duration> {
    expiration.filter(|d| !d.is_zero())
}

#[async_trait]
impl Storage for StorageBackend {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expiration: Option<Duration>,
    ) -> Result<(), SchedulerError> {
        match self {
            Self::Redis(s) => s.set(key, value, expiration).await,
            Self::Memory(s) => s.set(key, value, expiration).await,
        }
    }

    async fn get(&self, key: &str) -> Result<String, SchedulerError> {
        match self {
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SchedulerError> {
        match self {
            Self::Redis(s) => s.delete(key).await,
            Self::Memory(s) => s.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, SchedulerError> {
        match self {
            Self::Redis(s) => s.exists(key).await,
            Self::Memory(s) => s.exists(key).await,
        }
    }
}
