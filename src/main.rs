use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pokespeare::{
    build_mediator, build_router, AppConfig, AppState, InMemoryCache, PokeApiClient,
    ShakespeareTranslationClient,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting pokespeare...");

    let config = AppConfig::from_env().context("invalid configuration")?;

    let pokemon = Arc::new(
        PokeApiClient::new(&config.pokemon_api).context("failed to build pokemon api client")?,
    );
    let translator = Arc::new(
        ShakespeareTranslationClient::new(&config.translation_api)
            .context("failed to build translation api client")?,
    );
    let cache = Arc::new(InMemoryCache::new(config.cache.clone()));

    let mediator = build_mediator(pokemon, translator, cache.clone(), &config.cache)
        .context("mediator verification failed")?;

    spawn_cache_cleanup(cache, Duration::from_secs(config.cache.cleanup_interval_seconds));

    let router = build_router(AppState { mediator });
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("HTTP Server listening on http://{}", config.bind_addr);
    info!("Try: curl http://{}/pokemon/ditto", config.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn spawn_cache_cleanup(cache: Arc<InMemoryCache>, every: Duration) {
    if every.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            cache.purge_expired();
        }
    });
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
