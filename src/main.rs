use std::sync::Arc;

use anyhow::Context as _;
use dotenvy::dotenv;
use tracing::{info, warn};

use hark::api::{build_router, ApiState, VersionModel};
use hark::config::ServiceConfig;
use hark::corpus::{CoreInstance, DirectoryCorpus};
use hark::search::workers::SearchWorkerPool;
use hark::session::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;

    let corpus: Arc<dyn CoreInstance> = match &config.corpus_dir {
        Some(dir) => Arc::new(
            DirectoryCorpus::load(dir, config.dump_dir.clone(), &config.music)
                .context("Failed to load reference corpus")?,
        ),
        None => {
            warn!("CORPUS_DIR is not set; starting with an empty corpus");
            Arc::new(DirectoryCorpus::empty(config.dump_dir.clone()))
        }
    };
    info!("Corpus ready: {} tracks", corpus.track_count());

    let pool = Arc::new(SearchWorkerPool::allocate(
        config.search_workers,
        corpus.peak_index(),
        corpus.track_count(),
    ));
    let registry = SessionRegistry::new(Arc::clone(&corpus), pool, config.music.clone());

    let state = ApiState {
        registry,
        version: VersionModel::default(),
    };
    let app = build_router(state, &config.base_path);

    let address = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Listening on {address} under {}", config.base_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
