use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use somnia_api::config::{AppConfig, ServerConfig, TelemetryConfig};
use somnia_api::routes;
use somnia_api::state::AppState;
use somnia_api::ws::WsManager;
use somnia_pipeline::{
    DeviceBinding, EscalationPolicy, EscalationTracker, HttpClassifier, IngestService,
    IngestionBuffer, MemoryDirectory, MemoryStore, RateLimiter, SharedStore,
};

/// Build a test `AppConfig` with safe defaults.
///
/// The classifier URL points at an unroutable port so classifier calls
/// fail fast instead of hanging.
pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
        },
        telemetry: TelemetryConfig {
            flush_period: Duration::from_secs(1800),
            classifier_url: "http://127.0.0.1:1".to_string(),
            classifier_timeout: Duration::from_secs(1),
            escalation_threshold: 5,
            escalation_window: Duration::from_secs(900),
            rate_limit_quota: 100,
            rate_limit_window: Duration::from_secs(1800),
            vitals_query_window: chrono::Duration::seconds(1800),
        },
    }
}

/// Build the full application router with all middleware layers, backed by
/// in-memory pipeline components.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses. The database pool is lazy and
/// never connected by the non-database routes under test; the device
/// directory and shared store are in-memory.
pub fn build_test_app(directory: Arc<MemoryDirectory>) -> Router {
    build_test_app_with(directory, test_config())
}

/// Like [`build_test_app`] but with an explicit configuration, for tests
/// that need particular telemetry tunables (e.g. a tiny rate-limit quota).
pub fn build_test_app_with(directory: Arc<MemoryDirectory>, config: AppConfig) -> Router {
    // Never actually connected by the routes these tests hit. The short
    // acquire timeout makes DB-touching routes (e.g. /health) fail fast
    // instead of retrying for sqlx's default 30 s, which would collide
    // with the request timeout layer below.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(1))
        .connect_lazy("postgres://postgres@127.0.0.1:5432/somnia_test")
        .expect("lazy pool");

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let ws_manager = Arc::new(WsManager::new());
    let event_bus = Arc::new(somnia_events::EventBus::default());

    let classifier = Arc::new(
        HttpClassifier::new(
            config.telemetry.classifier_url.clone(),
            config.telemetry.classifier_timeout,
        )
        .expect("classifier client"),
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
    let ingest = Arc::new(IngestService::new(directory.clone(), buffer));
    let limiter = Arc::new(RateLimiter::new(
        Arc::clone(&store),
        config.telemetry.rate_limit_quota,
        config.telemetry.rate_limit_window,
    ));
    let (feed_tx, _feed_rx) = tokio::sync::mpsc::channel(16);

    let state = AppState {
        pool,
        config: Arc::new(config),
        ws_manager,
        event_bus,
        directory,
        ingest,
        limiter,
        tracker,
        classifier,
        feed_tx,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// A directory pre-seeded with one device bound to patient 1.
pub async fn seeded_directory() -> Arc<MemoryDirectory> {
    let directory = Arc::new(MemoryDirectory::new());
    directory
        .insert(DeviceBinding {
            device_id: 1,
            serial_number: "SN-BOUND-1".to_string(),
            model: Some("apnea-one".to_string()),
            patient_id: Some(1),
        })
        .await;
    directory
        .insert(DeviceBinding {
            device_id: 2,
            serial_number: "SN-UNBOUND-1".to_string(),
            model: Some("apnea-one".to_string()),
            patient_id: None,
        })
        .await;
    directory
}

/// Issue a GET request against the app.
#[allow(dead_code)]
pub async fn get(app: Router, uri: &str) -> Response<axum::body::Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-patient-id", "1")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Issue a POST request with a JSON body and the default caller identity.
#[allow(dead_code)]
pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> Response<axum::body::Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-patient-id", "1")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Consume a response body and parse it as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
