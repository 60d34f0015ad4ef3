use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use nekretnine_search::adapters::cache::memory::MemoryCache;
use nekretnine_search::adapters::cache::redis::RedisCache;
use nekretnine_search::adapters::openai::OpenAiClient;
use nekretnine_search::adapters::store::memory::MemoryListingStore;
use nekretnine_search::adapters::store::qdrant::QdrantListingStore;
use nekretnine_search::chat::session::SessionManager;
use nekretnine_search::config::load_config;
use nekretnine_search::domain::job::JobType;
use nekretnine_search::domain::listing::ListingType;
use nekretnine_search::http::{AppState, router};
use nekretnine_search::jobs::queue::JobQueue;
use nekretnine_search::jobs::scheduler::Scheduler;
use nekretnine_search::jobs::worker::ScrapeWorker;
use nekretnine_search::ports::cache::KeyValueCache;
use nekretnine_search::ports::listing_store::ListingStore;
use nekretnine_search::ports::llm::LanguageModel;
use nekretnine_search::scrape::CancelToken;
use nekretnine_search::scrape::pool::FetchPool;
use nekretnine_search::scrape::runner::ScrapeRunner;
use nekretnine_search::scrape::sources::default_fleet;
use nekretnine_search::search::embeddings::EmbeddingService;
use nekretnine_search::search::extractor::FilterExtractor;
use nekretnine_search::search::semantic::SemanticSearch;

fn find_config_path() -> PathBuf {
    let candidates = [PathBuf::from("config.yaml"), exe_dir().join("config.yaml")];
    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }
    candidates[0].clone()
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting nekretnine-search");

    let config = load_config(&find_config_path())?;

    // Cache: Redis when configured, in-process otherwise
    let cache: Arc<dyn KeyValueCache> = match &config.cache.redis_url {
        Some(url) => {
            tracing::info!("Using Redis session/embedding cache");
            Arc::new(RedisCache::connect(url).await?)
        }
        None => {
            tracing::info!("No Redis configured, using in-process cache");
            Arc::new(MemoryCache::new(config.cache.max_entries))
        }
    };

    // Listing store: Qdrant when configured, in-memory otherwise
    let store: Arc<dyn ListingStore> = match &config.store.qdrant_url {
        Some(_) => {
            tracing::info!("Using Qdrant listing store");
            Arc::new(QdrantListingStore::connect(&config.store, config.provider.embedding_dims).await?)
        }
        None => {
            tracing::warn!("No Qdrant configured, using in-memory listing store");
            Arc::new(MemoryListingStore::new())
        }
    };

    // Provider client fails fast on a missing API key
    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(&config.provider)?);

    let embeddings = Arc::new(EmbeddingService::new(
        Arc::clone(&model),
        Arc::clone(&cache),
        &config.cache,
        config.provider.embedding_dims,
    ));
    let search = Arc::new(SemanticSearch::new(
        Arc::clone(&embeddings),
        Arc::clone(&store),
        config.search.clone(),
    ));
    let sessions = Arc::new(SessionManager::new(
        FilterExtractor::new(Arc::clone(&model)),
        Arc::clone(&search),
        Arc::clone(&cache),
        &config.cache,
    ));

    // Job queue, repeatable schedules, worker
    let queue = Arc::new(JobQueue::new(&config.jobs));
    let scheduler = Arc::new(Scheduler::new());
    scheduler.register(
        "full-scrape",
        &config.jobs.full_scrape_cron,
        JobType::FullScrape,
        None,
    )?;
    scheduler.register(
        "rental-scrape",
        &config.jobs.rental_scrape_cron,
        JobType::ListingTypeScrape,
        Some(ListingType::Rent),
    )?;

    let pool = Arc::new(FetchPool::new(config.scraping.clone()));
    let _sweeper = pool.spawn_sweeper();
    let runner = ScrapeRunner::new(
        Arc::clone(&store),
        Arc::clone(&pool),
        config.scraping.clone(),
    );

    let shutdown = CancelToken::new();
    let worker = ScrapeWorker::new(
        Arc::clone(&queue),
        Arc::clone(&scheduler),
        runner,
        Arc::clone(&pool),
        default_fleet(),
        Arc::clone(&store),
        Some(Arc::clone(&embeddings)),
        Arc::clone(&cache),
        config.jobs.clone(),
        config.scraping.stale_after_days,
        Duration::from_secs(config.cache.scrape_status_ttl_secs),
    );
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_shutdown).await });

    // HTTP server
    let state = AppState {
        sessions,
        search,
        store,
        queue,
        scheduler,
        cache,
        admin_token: config.server.admin_token.clone(),
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!("Listening on {}", config.server.bind_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    // Let the in-flight job drain before exiting
    let _ = tokio::time::timeout(
        Duration::from_secs(config.jobs.shutdown_grace_secs + config.jobs.job_timeout_secs),
        worker_handle,
    )
    .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
