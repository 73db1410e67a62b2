use admin_api::AdminState;
use anyhow::Context;
use background_service::{BackgroundService, DispatchPipeline, PipelineRunner, SourceScheduler};
use database::Database;
use media_resolver::{redgifs_token_cache, MediaDownloader, MediaResolver, RedgifsClient};
use reddit_client::{RedditClient, RedditClientConfig};
use relay_core::AppConfig;
use std::sync::Arc;
use telegram_dispatch::TelegramDispatcher;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reddit_relay=info,background_service=info,admin_api=info,\
reddit_client=info,media_resolver=info,telegram_dispatch=info,database=info,relay_core=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting Reddit Relay");

    let config = AppConfig::load().context("loading configuration")?;
    config.log_redacted();

    let db = Arc::new(
        Database::open(config.database_url.clone())
            .await
            .context("opening database")?,
    );

    let reddit = Arc::new(RedditClient::new(RedditClientConfig::new(
        config.reddit_client_id.clone(),
        config.reddit_client_secret.clone(),
        config.reddit_user_agent.clone(),
    ))?);
    let resolver = Arc::new(MediaResolver::new(redgifs_token_cache(RedgifsClient::new()?)));
    let downloader = Arc::new(
        MediaDownloader::new(&config.download_dir).context("preparing download directories")?,
    );
    let dispatcher = Arc::new(TelegramDispatcher::new(
        config.telegram_bot_token.clone(),
        config.telegram_channel_id.clone(),
    )?);

    let pipeline = Arc::new(
        DispatchPipeline::new(
            reddit.clone(),
            db.clone(),
            db.clone(),
            resolver,
            downloader,
            dispatcher,
        )
        .with_fetch_limit(config.fetch_limit),
    );
    let runner = Arc::new(PipelineRunner::new(pipeline, db.clone()));
    let scheduler = Arc::new(SourceScheduler::new(runner));

    let service = BackgroundService::new(db.clone(), scheduler.clone());
    service.start().await.context("scheduling active sources")?;

    let app = admin_api::router(AdminState {
        store: db.clone(),
        ledger: db.clone(),
        directory: reddit,
        scheduler,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding admin API to {}", config.bind_addr))?;
    tracing::info!("Admin API listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.stop();
    db.close().await;
    tracing::info!("Reddit Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
