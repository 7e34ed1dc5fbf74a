use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use charter_league::{
    config::LeagueConfig, create_app, DatabasePool, InMemoryStore, LeagueApiState, LeagueEngine,
    LeagueStore, SeasonScheduler, SecurityConfig, SecurityState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = LeagueConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check LEAGUE_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting charter league server");

    let store = open_store(&config).await?;
    let engine = Arc::new(LeagueEngine::new(
        store,
        config.season.to_settings(),
        config.retry.clone(),
    ));

    let season = engine
        .bootstrap(Utc::now())
        .await
        .context("Failed to bootstrap current season")?;
    info!(
        season_id = %season.id,
        status = %season.status,
        ends_at = %season.ends_at,
        "Current season"
    );

    let scheduler = Arc::new(SeasonScheduler::new(
        engine.clone(),
        Duration::from_secs(config.season.close_check_interval_secs),
        config.retry.clone(),
    ));
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await });
    }

    let admin_api_key = Some(config.admin_api_key.clone()).filter(|k| !k.is_empty());
    if admin_api_key.is_none() {
        warn!("Admin endpoints disabled: LEAGUE_ADMIN_API_KEY is not set");
    }
    let security = SecurityState::new(SecurityConfig {
        admin_api_key,
        log_requests: config.logging.log_requests,
        ..SecurityConfig::default()
    });

    let app = create_app(LeagueApiState { engine }, security);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("League server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    info!("League server stopped");

    Ok(())
}

async fn open_store(config: &LeagueConfig) -> Result<Arc<dyn LeagueStore>> {
    if !config.database.postgres_enabled {
        warn!("PostgreSQL disabled, league state is kept in memory and lost on restart");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    info!("Connecting to PostgreSQL at {}", config.redacted_postgres_url());
    let pool = DatabasePool::new(&config.database.postgres_url, config.database.max_connections)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    pool.init_schema().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(Arc::new(pool.league_store()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize logging from configuration
fn init_logging(config: &LeagueConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
