use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use somnia_api::config::{AppConfig, ServerConfig};
use somnia_api::{fanout, routes, state, ws};
use somnia_pipeline::{
    EscalationPolicy, EscalationTracker, FeedConsumer, FlushConfig, FlushScheduler, HttpClassifier,
    IngestService, IngestionBuffer, MemoryStore, PgDeviceDirectory, PgVitalsSink, RateLimiter,
};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "somnia_api=debug,somnia_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = AppConfig::from_env();
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        flush_period_secs = config.telemetry.flush_period.as_secs(),
        "Loaded configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = somnia_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    somnia_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    somnia_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config.server);

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Event bus ---
    let event_bus = Arc::new(somnia_events::EventBus::default());
    tracing::info!("Event bus created");

    // --- Shared store and pipeline components ---
    let store: Arc<dyn somnia_pipeline::SharedStore> = Arc::new(MemoryStore::new());

    let directory = Arc::new(PgDeviceDirectory::new(pool.clone()));
    let sink = Arc::new(PgVitalsSink::new(pool.clone()));
    let classifier = Arc::new(
        HttpClassifier::new(
            config.telemetry.classifier_url.clone(),
            config.telemetry.classifier_timeout,
        )
        .expect("Failed to build classifier HTTP client"),
    );

    let tracker = Arc::new(EscalationTracker::new(
        Arc::clone(&store),
        EscalationPolicy {
            threshold: config.telemetry.escalation_threshold,
            window: config.telemetry.escalation_window,
        },
        Arc::clone(&event_bus),
    ));

    let buffer = IngestionBuffer::new(Arc::clone(&store));
    let ingest = Arc::new(IngestService::new(directory.clone(), buffer.clone()));
    let limiter = Arc::new(RateLimiter::new(
        Arc::clone(&store),
        config.telemetry.rate_limit_quota,
        config.telemetry.rate_limit_window,
    ));

    // Spawn the flush scheduler (drain, average, classify, persist).
    let flush_cancel = tokio_util::sync::CancellationToken::new();
    let scheduler = FlushScheduler::new(
        buffer,
        directory.clone(),
        sink,
        classifier.clone(),
        Arc::clone(&tracker),
        Arc::clone(&event_bus),
        FlushConfig {
            period: config.telemetry.flush_period,
            classifier_timeout: config.telemetry.classifier_timeout,
        },
    );
    let flush_cancel_clone = flush_cancel.clone();
    let flush_handle = tokio::spawn(async move {
        scheduler.run(flush_cancel_clone).await;
    });

    // Spawn the push-feed consumer (WebSocket readings -> ingestion).
    let (feed_tx, feed_rx) = tokio::sync::mpsc::channel(256);
    let feed_consumer = FeedConsumer::new(Arc::clone(&ingest));
    let feed_handle = tokio::spawn(feed_consumer.run(feed_rx));

    // Spawn event fan-out (pushes aggregates and alerts to subscribers).
    let fanout_cancel = tokio_util::sync::CancellationToken::new();
    let event_fanout = fanout::EventFanout::new(Arc::clone(&ws_manager));
    let fanout_handle =
        tokio::spawn(event_fanout.run(event_bus.subscribe(), fanout_cancel.clone()));

    tracing::info!("Telemetry services started (flush scheduler, feed consumer, fan-out)");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        directory,
        ingest,
        limiter,
        tracker,
        classifier,
        feed_tx,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.server.host.parse().expect("Invalid HOST address"),
        config.server.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let shutdown_budget = Duration::from_secs(config.server.shutdown_timeout_secs);

    // Stop the flush scheduler; an in-flight cycle finishes first so
    // buffered readings are not stranded.
    flush_cancel.cancel();
    let _ = tokio::time::timeout(shutdown_budget, flush_handle).await;
    tracing::info!("Flush scheduler stopped");

    // Stop the fan-out via its token; shutdown must not depend on every
    // remaining bus handle being dropped first.
    fanout_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), fanout_handle).await;
    tracing::info!("Event fan-out shut down");
    drop(event_bus);

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    // The feed sender lives in the (now dropped) app state; the consumer
    // exits once all senders are gone.
    let _ = tokio::time::timeout(Duration::from_secs(5), feed_handle).await;
    tracing::info!("Feed consumer stopped");

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
