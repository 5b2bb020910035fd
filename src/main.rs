use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use flint_gateway::{
    api::{
        auth_middleware, create_security_router, create_shield_router, logging_middleware,
        security_headers_middleware, MiddlewareState, SecurityApiState, ShieldApiState,
    },
    config::GatewayConfig,
    AlertEngine, EventJournal, JournalRepository, MemoryStore, ReputationTracker, ShieldEngine,
    ShieldJournal,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all security requirements
    let config = GatewayConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check FLINT_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting Flint security gateway");
    info!(
        "Security settings: admin auth enabled: {}, postgres journal: {}",
        config.security.enable_admin_auth, config.journal.postgres_enabled
    );

    // Shared ephemeral store for all hot-path state
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn flint_gateway::CacheStore> = memory.clone();

    // Event journal, optionally mirrored to Postgres
    let mut journal = EventJournal::new(config.journal.max_memory_events);
    if config.journal.postgres_enabled {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.journal.postgres_url)
            .await
            .context("Failed to connect to Postgres")?;
        let repository = JournalRepository::new(pool);
        repository
            .init_schema()
            .await
            .context("Failed to initialize journal schema")?;
        journal = journal.with_repository(repository);
        info!("Journal persistence enabled (PostgreSQL)");
    }
    let journal = Arc::new(journal);

    // Core engines
    let tracker = Arc::new(ReputationTracker::new(
        store.clone(),
        journal.clone(),
        config.reputation.clone(),
    ));
    let engine = Arc::new(ShieldEngine::new(
        store.clone(),
        journal.clone(),
        tracker.clone(),
        config.shield.clone(),
    ));
    let alerts = Arc::new(AlertEngine::new(journal.clone()));
    info!(
        "Reputation initialized: threshold={}, base_block={}s, max_block={}s",
        config.reputation.failure_threshold,
        config.reputation.base_block_secs,
        config.reputation.max_block_secs
    );
    info!(
        "Shield initialized: difficulty [{}, {}] bits, challenge ttl={}s",
        config.shield.min_difficulty, config.shield.max_difficulty, config.shield.challenge_ttl_secs
    );

    // The memory store reclaims expired entries lazily on access; sweep
    // periodically so abandoned keys do not pile up.
    {
        let memory = memory.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                memory.purge_expired();
            }
        });
    }

    let middleware_state = MiddlewareState {
        security: config.security.clone(),
        logging: config.logging.clone(),
    };

    // Build the application with routes and middleware layers
    let app = Router::new()
        .nest(
            "/security",
            create_security_router(SecurityApiState {
                tracker: tracker.clone(),
                journal: journal.clone(),
                alerts: alerts.clone(),
            }),
        )
        .nest(
            "/shield",
            create_shield_router(ShieldApiState {
                engine: engine.clone(),
                shield_journal: ShieldJournal::new(journal.clone()),
            }),
        )
        .route("/health", get(|| async { "OK" }))
        .layer(middleware::from_fn_with_state(
            middleware_state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn_with_state(
            middleware_state.clone(),
            logging_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Flint gateway listening on {}", bind_addr);

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging(config: &GatewayConfig) -> Result<()> {
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
        .context("Failed to set logging subscriber")?;
    Ok(())
}
