use super::{ExecContext, Storage, effective_expiration};
use crate::config::StoreSettings;
use crate::error::SchedulerError;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Redis-backed [`Storage`] over a single multiplexed connection.
///
/// Clones share the connection; the client library makes it safe for
/// concurrent callers.
#[derive(Clone)]
pub struct RedisStorage {
    conn: MultiplexedConnection,
    ctx: ExecContext,
    endpoint: String,
}

impl RedisStorage {
    /// Parse `settings.url`, open a connection and PING it.
    ///
    /// Connect and PING run under a child of `ctx` bounded by
    /// `settings.timeout`; the returned handle is bound to `ctx` itself.
    /// A malformed url fails with `ConnectionUriInvalid` before any I/O.
    /// Connect or PING failures (refused, timeout, auth) fail with
    /// `ConnectionFailed`.
    pub async fn connect(
        settings: &StoreSettings,
        ctx: ExecContext,
    ) -> Result<Self, SchedulerError> {
        let endpoint = redact_url(&settings.url);
        let client = Client::open(settings.url.as_str()).map_err(|e| {
            warn!(endpoint = %endpoint, error = %e, "error while parsing redis url");
            SchedulerError::ConnectionUriInvalid(e)
        })?;

        let connect_ctx = ctx.child(Some(settings.connect_timeout()));
        let mut conn = connect_ctx
            .run(client.get_multiplexed_async_connection())
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "redis connection failed");
                SchedulerError::connection_failed(e)
            })?;

        let pong: String = connect_ctx
            .run(::redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "redis liveness check failed");
                SchedulerError::connection_failed(e)
            })?;
        debug!(endpoint = %endpoint, reply = %pong, "redis liveness check ok");

        info!(endpoint = %endpoint, "Redis client instantiated");
        Ok(Self {
            conn,
            ctx,
            endpoint,
        })
    }

    /// Same connection, different execution context.
    pub fn with_context(&self, ctx: ExecContext) -> Self {
        Self {
            conn: self.conn.clone(),
            ctx,
            endpoint: self.endpoint.clone(),
        }
    }

    /// Connection url with any password masked.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("endpoint", &self.endpoint)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expiration: Option<Duration>,
    ) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        match effective_expiration(expiration) {
            Some(ttl) => {
                let mut cmd = ::redis::cmd("SET");
                cmd.arg(key).arg(value).arg("PX").arg(ttl_millis(ttl));
                self.ctx.run(cmd.query_async(&mut conn)).await
            }
            None => self.ctx.run(conn.set::<_, _, ()>(key, value)).await,
        }
    }

    async fn get(&self, key: &str) -> Result<String, SchedulerError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = self.ctx.run(conn.get(key)).await?;
        value.ok_or_else(|| SchedulerError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        self.ctx.run(conn.del::<_, ()>(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, SchedulerError> {
        let mut conn = self.conn.clone();
        let found: u64 = self.ctx.run(conn.exists(key)).await?;
        Ok(found == 1)
    }
}

/// Milliseconds for `SET .. PX`: sub-millisecond ttls round up to 1,
/// anything past `u64::MAX` ms saturates.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Mask the password of a connection url for logging.
fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
