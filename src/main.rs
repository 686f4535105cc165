use robotech::{
    cache::create_redis_pool, create_db_pool, create_router, init_tracing, shutdown_telemetry,
    AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "robotech",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    let issues = config.validate_for_production();
    if !issues.is_empty() {
        for issue in &issues {
            warn!(issue = %issue, "Configuration warning");
        }
    }

    info!(
        database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let db_pool = create_db_pool(&config);

    info!("Database connection pool created");

    if let Err(e) = tokio::fs::create_dir_all(&config.media.root).await {
        error!(error = %e, root = %config.media.root.display(), "Failed to create media root");
        std::process::exit(1);
    }

    let redis_pool = create_redis_pool(&config.redis);
    let state = AppState::new(db_pool, redis_pool, &config);
    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        media_url = %config.media.url_prefix,
        "HTTP server ready"
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    let ctrl_c = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for CTRL+C"),
        }
        let _ = shutdown_tx.send(());
    };
    tokio::spawn(ctrl_c);

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
    })
    .await;

    if let Err(e) = result {
        error!(error = %e, "HTTP server error");
    }

    shutdown_telemetry();

    info!("Server shutdown complete");
}
