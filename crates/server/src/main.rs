mod config;
mod http;
mod state;

use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{NewsMode, Settings};
use http::router::build_router;
use relay::{ArticleChecker, Dispatcher, HttpArticleChecker, MemoryBus, SqlArticleChecker};
use state::AppState;
use storage::Db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new().context("Failed to load configuration")?;

    let db = Db::new(&settings.database.url)
        .await
        .context("Failed to open comments database")?;

    let checker: Arc<dyn ArticleChecker> = match settings.news.mode {
        NewsMode::Http => {
            info!("Checking articles against {}", settings.news.base_url);
            Arc::new(HttpArticleChecker::new(&settings.news.base_url, settings.news.timeout())?)
        }
        NewsMode::Sql => {
            let news_db = Db::connect(&settings.news.database_url)
                .await
                .context("Failed to open news database")?;
            Arc::new(SqlArticleChecker::new(news_db, settings.news.timeout()))
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(db.clone()),
        checker,
        settings.comments.paging(),
    ));

    let relay_settings = settings.relay.to_relay_settings();
    let bus = MemoryBus::with_retention(settings.relay.bus_retention);
    let cancel_token = CancellationToken::new();
    let supervisor = relay::start_with_cancel_token(
        &relay_settings,
        &bus,
        dispatcher.clone(),
        cancel_token.clone(),
    );

    let state = AppState {
        dispatcher,
        bus: bus.clone(),
        relay: relay_settings,
    };

    let app = build_router(state, &settings.server.cors_origins);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        warn!("HTTP server stopped with error: {}", e);
    }

    // HTTP 停止后再收尾 relay，处理中的消息会先完成
    for (name, stats) in supervisor.shutdown().await {
        info!(
            "Relay {} stopped: received={} published={} committed={} malformed={}",
            name, stats.received, stats.published, stats.committed, stats.malformed
        );
    }
    bus.close();
    db.close().await;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
