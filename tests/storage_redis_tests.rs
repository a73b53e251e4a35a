use std::time::{Duration, Instant};
use task_scheduler::storage::{self, RedisStorage};
use task_scheduler::{ErrorKind, ExecContext, Storage, StoreSettings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// Live-server tests run only when `REDIS_TEST_URL` points at a disposable Redis.
fn live_settings() -> Option<StoreSettings> {
    std::env::var("REDIS_TEST_URL")
        .ok()
        .filter(|url| !url.is_empty())
        .map(StoreSettings::new)
}

fn unique_key(name: &str) -> String {
    format!("task-scheduler-test:{}:{}", std::process::id(), name)
}

/// Minimal RESP responder on a random local port: PING gets PONG, EXISTS
/// reports one key, anything else gets OK. With `answer = false` it reads
/// commands and never replies.
async fn spawn_fake_redis(answer: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake redis");
    let addr = listener.local_addr().expect("fake redis addr");
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_resp(socket, answer));
        }
    });
    format!("redis://{addr}")
}

async fn serve_resp(socket: TcpStream, answer: bool) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    while let Some(args) = read_command(&mut reader).await {
        if !answer {
            continue;
        }
        let reply: &[u8] = match args.first().map(|a| a.to_ascii_uppercase()).as_deref() {
            Some("PING") => b"+PONG\r\n",
            Some("EXISTS") => b":1\r\n",
            _ => b"+OK\r\n",
        };
        if write.write_all(reply).await.is_err() {
            return;
        }
    }
}

async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let count: usize = read_line(reader).await?.strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        read_line(reader).await?.strip_prefix('$')?;
        args.push(read_line(reader).await?);
    }
    Some(args)
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches("\r\n").to_string()),
    }
}

#[tokio::test]
async fn handle_outlives_connect_timeout() {
    let settings = StoreSettings {
        url: spawn_fake_redis(true).await,
        timeout: 1,
    };
    let store = storage::connect(&settings, ExecContext::background())
        .await
        .expect("fake redis answers PING");
    assert!(store.exists("k").await.expect("exists"));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(
        store
            .exists("k")
            .await
            .expect("calls keep working past redis.timeout")
    );
}

#[tokio::test]
async fn silent_server_fails_within_connect_timeout() {
    let settings = StoreSettings {
        url: spawn_fake_redis(false).await,
        timeout: 1,
    };
    let started = Instant::now();
    let err = storage::connect(&settings, ExecContext::background())
        .await
        .expect_err("no PONG, no handle");
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn malformed_url_is_rejected_before_connecting() {
    let settings = StoreSettings::new("INVALID");
    let started = Instant::now();
    let err = RedisStorage::connect(&settings, ExecContext::background())
        .await
        .expect_err("malformed url must not connect");
    assert_eq!(err.kind(), ErrorKind::ConnectionUriInvalid);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn refused_connection_fails() {
    let settings = StoreSettings::new("redis://127.0.0.1:1");
    let err = storage::connect(&settings, ExecContext::with_timeout(Duration::from_secs(5)))
        .await
        .expect_err("nothing listens on port 1");
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
}

#[tokio::test]
async fn unreachable_host_fails_within_deadline() {
    // non-routable address: either refused or left hanging until the deadline
    let settings = StoreSettings::new("redis://10.255.255.1:6379");
    let started = Instant::now();
    let err = RedisStorage::connect(&settings, ExecContext::with_timeout(Duration::from_millis(300)))
        .await
        .expect_err("unreachable host must not connect");
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn cancelled_context_fails_connection() {
    let ctx = ExecContext::background();
    ctx.cancel();
    let settings = StoreSettings::new("redis://127.0.0.1:6379");
    let err = RedisStorage::connect(&settings, ctx)
        .await
        .expect_err("cancelled context must not connect");
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
}

#[tokio::test]
async fn live_set_get_exists_delete() {
    let Some(settings) = live_settings() else {
        eprintln!("REDIS_TEST_URL not set; skipping");
        return;
    };
    let store = storage::connect(&settings, ExecContext::with_timeout(Duration::from_secs(10)))
        .await
        .expect("live redis should accept connections");
    let key = unique_key("crud");

    store.set(&key, "v", None).await.expect("set");
    assert_eq!(store.get(&key).await.expect("get"), "v");
    assert!(store.exists(&key).await.expect("exists"));

    store.delete(&key).await.expect("delete");
    assert!(!store.exists(&key).await.expect("exists"));

    let err = store.get(&key).await.expect_err("deleted key");
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
}

#[tokio::test]
async fn live_expiration() {
    let Some(settings) = live_settings() else {
        eprintln!("REDIS_TEST_URL not set; skipping");
        return;
    };
    let store = RedisStorage::connect(&settings, ExecContext::background())
        .await
        .expect("live redis should accept connections");
    let key = unique_key("ttl");

    store
        .set(&key, "short-lived", Some(Duration::from_millis(200)))
        .await
        .expect("set with ttl");
    assert!(store.exists(&key).await.expect("exists"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!store.exists(&key).await.expect("exists after ttl"));

    // zero ttl means no expiry
    store.set(&key, "kept", Some(Duration::ZERO)).await.expect("set");
    assert_eq!(store.get(&key).await.expect("get"), "kept");
    store.delete(&key).await.expect("cleanup");
}

#[tokio::test]
async fn live_rebound_context_is_cancellable() {
    let Some(settings) = live_settings() else {
        eprintln!("REDIS_TEST_URL not set; skipping");
        return;
    };
    let store = RedisStorage::connect(&settings, ExecContext::background())
        .await
        .expect("live redis should accept connections");

    let ctx = ExecContext::background();
    let scoped = store.with_context(ctx.clone());
    ctx.cancel();
    let err = scoped
        .exists(&unique_key("cancelled"))
        .await
        .expect_err("cancelled context");
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    // the unscoped handle keeps working
    store.exists(&unique_key("cancelled")).await.expect("exists");
}
