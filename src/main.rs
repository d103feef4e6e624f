pub mod api;
mod config;
mod providers;
mod sync;

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use sync::RefreshManager;

#[derive(OpenApi)]
#[openapi(
    info(title = "Essingen Bus Departures API", version = "0.2.0"),
    paths(
        api::departures::get_departures,
        api::departures::trigger_refresh,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::departures::RefreshResponse,
        api::health::HealthResponse,
        sync::Departure,
        sync::Snapshot,
        sync::SnapshotSource,
    )),
    tags(
        (name = "departures", description = "Real-time departure information"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(
        site_id = %config.stop.site_id,
        line = %config.stop.line,
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Start the refresh manager in the background
    let manager =
        Arc::new(RefreshManager::new(config).expect("Failed to initialize refresh manager"));
    let store = manager.snapshot_store();
    let registry = manager.subscriber_registry();
    let refresh_trigger = manager.refresh_trigger();

    // Populate the store before accepting connections
    manager.refresh_once().await;

    let shutdown = CancellationToken::new();
    let manager_clone = manager.clone();
    let loop_shutdown = shutdown.clone();
    let refresh_loop = tokio::spawn(async move {
        manager_clone.run(loop_shutdown).await;
    });

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(store, registry, refresh_trigger))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000")
        .await
        .expect("Failed to bind to port 8000");

    tracing::info!("Server running on http://localhost:8000");
    tracing::info!("Swagger UI: http://localhost:8000/swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Failed to start server");

    // Wait for the refresh loop to wind down before exiting
    let _ = refresh_loop.await;
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

async fn root() -> &'static str {
    "Essingen Bus Departures API"
}
