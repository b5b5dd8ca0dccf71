//! Crawl console binary.
//! Boots storage, the dispatcher, the background scheduler (when this process
//! holds the leader lock) and the axum server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crawl_console::{
    ai::build_summarizer,
    config::AppConfig,
    create_router,
    leader::LeaderLock,
    metrics::Metrics,
    scheduler::spawn_scheduler,
    AppState, Collector, Console, Dispatcher, SqliteStore, Store,
};

/// `RUST_LOG` wins; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crawl_console=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init()?;

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&cfg.store.path)
            .with_context(|| format!("opening store {}", cfg.store.path.display()))?,
    );
    let dispatcher = Arc::new(
        Dispatcher::standard(store.clone(), &cfg.crawl).context("building HTTP client")?,
    );
    let collector = Collector::new(store.clone(), dispatcher, cfg.scheduler.max_items);
    let console = Console::new(store, collector.clone());
    let summarizer = build_summarizer(&cfg.ai).context("building summarizer")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Held until the end of main; dropping it removes the PID file.
    let mut _leader = None;
    let mut scheduler = None;
    if cfg.scheduler.enabled {
        match LeaderLock::acquire(&cfg.scheduler.lock_path) {
            Ok(lock) => {
                _leader = Some(lock);
                scheduler = Some(spawn_scheduler(
                    Arc::new(collector),
                    Duration::from_secs(cfg.scheduler.tick_secs),
                    shutdown_rx,
                ));
            }
            Err(e) => tracing::warn!(error = %e, "scheduler lock held elsewhere; serving without a scheduler"),
        }
    } else {
        tracing::info!("scheduler disabled by configuration");
    }

    let app = create_router(AppState {
        console,
        summarizer,
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "crawl console listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        // An in-flight tick finishes before the loop exits.
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "scheduler task ended abnormally");
        }
    }
    Ok(())
}
