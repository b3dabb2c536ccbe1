use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use keel_core::config::StoreBackend;
use keel_core::{
    Config, ConfigHandle, FileStore, HealthProbe, MemoryStore, NetProbe, NodeView, Runtime,
    StoredNodes, TaskStore,
};
use keel_mesos::{HttpSchedulerClient, SchedulerClient, SchedulerEndpoint};
use keel_observe::{Journal, logger_init};
use taskvisor::Subscribe;

const CONFIG_ENV: &str = "KEEL_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Configuration
    let path = config_path()?;
    let cfg = Config::load(path.as_deref()).context("loading configuration")?;

    // 2) Logger
    logger_init(&cfg.logging)?;
    info!(
        framework = %cfg.framework.name,
        config = ?path,
        "configuration loaded"
    );

    // 3) Store
    let store: Arc<dyn TaskStore> = match cfg.store.backend {
        StoreBackend::Memory => {
            warn!("in-memory store: task records are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::File => Arc::new(
            FileStore::open(&cfg.store.path)
                .await
                .with_context(|| format!("opening store {}", cfg.store.path))?,
        ),
    };

    // 4) Collaborators
    let client: Arc<dyn SchedulerClient> = Arc::new(HttpSchedulerClient::new(SchedulerEndpoint {
        master: cfg.scheduler.master.clone(),
        username: cfg.scheduler.username.clone(),
        password: cfg.scheduler.password.clone(),
        call_timeout: Duration::from_millis(cfg.scheduler.call_timeout_ms),
        connect_timeout: Duration::from_millis(cfg.scheduler.connect_timeout_ms),
        accept_invalid_certs: cfg.scheduler.accept_invalid_certs,
    })?);
    let probe: Arc<dyn HealthProbe> = Arc::new(NetProbe::new(&cfg)?);
    let nodes: Arc<dyn NodeView> = Arc::new(StoredNodes::new(
        Arc::clone(&store),
        cfg.framework.name.clone(),
    ));

    // 5) Runtime
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Journal::new())];
    let runtime = Runtime::new(ConfigHandle::new(cfg), store, client, probe, nodes)
        .with_subscribers(subscribers);
    runtime.restore().await.context("restoring persisted state")?;

    // 6) Run until Ctrl+C
    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down...");
        }
        stop.cancel();
    });

    runtime.run(token).await?;
    Ok(())
}

/// `--config <path>` wins over `KEEL_CONFIG`; neither means environment only.
fn config_path() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config needs a path"),
            },
            other => bail!("unexpected argument {other:?}"),
        }
    }
    Ok(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}
