use mimalloc::MiMalloc;
use task_scheduler::{ConfigLoader, ExecContext, storage};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const ENV_FILE: &str = ".env";
const CONFIG_FILE: &str = "config/data.json";
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() {
    // RUST_LOG wins; otherwise the configured loglevel replaces the default once loaded.
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let (env_filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER)));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!("Task scheduler");
    let cfg = match ConfigLoader::load(ENV_FILE, CONFIG_FILE) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), "Error while loading config");
            std::process::exit(1);
        }
    };
    if !pinned && let Err(e) = filter_handle.reload(EnvFilter::new(&cfg.loglevel)) {
        warn!(loglevel = %cfg.loglevel, error = %e, "could not apply configured loglevel");
    }
    info!(loglevel = %cfg.loglevel, "Config loaded");

    // redis.timeout bounds only the connect; the handle lives for the process
    match storage::connect(&cfg.redis, ExecContext::background()).await {
        Ok(_storage) => info!("Storage ready"),
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), "Error while connecting storage");
            std::process::exit(1);
        }
    }
}
