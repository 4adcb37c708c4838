use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};

use eventgate_core::ProcessClassifier;
use eventgate_server::config::Config;
use eventgate_server::dispatch::{classification_worker_loop, ClassificationQueue};
use eventgate_server::reconciliation::requeue_pending_classifications;
use eventgate_server::state_machine::repository::SqliteRepository;
use eventgate_server::status::StatusData;
use eventgate_server::sweeper::sweep_loop;
use eventgate_server::{AppState, ModerationStore, SystemClock};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "eventgate",
        "version": eventgate_server::get_service_version(),
    })))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.all_events().await {
        Ok(events) => {
            let version = eventgate_server::get_service_version();
            Json(StatusData::from_events(&events, version)).into_response()
        }
        Err(e) => {
            error!("Failed to load events for status: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting eventgate moderation service");

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let db_path = config.database_path();
    info!("Using state database: {}", db_path.display());
    let sqlite_repo = SqliteRepository::new(&db_path).context("Failed to open SQLite database")?;

    let (queue, jobs) = ClassificationQueue::new();
    let store = Arc::new(ModerationStore::new(
        Arc::new(sqlite_repo),
        Arc::new(SystemClock),
        queue,
    ));

    info!(
        "Classifier: {} {} (timeout {:?}, {} attempt(s), concurrency {})",
        config.classifier.program,
        config.classifier.args.join(" "),
        config.classifier.timeout,
        config.retry.max_attempts,
        config.max_concurrency
    );
    let classifier = Arc::new(ProcessClassifier::new(config.classifier.clone()));

    // Requeue before the worker starts so recovered jobs are first in line.
    requeue_pending_classifications(&store).await;

    tokio::spawn(classification_worker_loop(
        store.clone(),
        classifier,
        config.retry.clone(),
        config.max_concurrency,
        jobs,
    ));
    tokio::spawn(sweep_loop(store.clone(), config.sweep_interval));

    let app_state = Arc::new(AppState { store });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
