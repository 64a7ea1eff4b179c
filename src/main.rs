use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use gridiron::market::OddsEngine;
use gridiron::{ApiClient, CacheStore, Config, GridironError, Predictor, ScheduleManager};

#[derive(Clone)]
struct AppState {
    predictor: Arc<Predictor>,
    schedule: Arc<ScheduleManager>,
    market: Arc<OddsEngine>,
    api: Arc<ApiClient>,
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "gridiron",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "api_calls": state.api.calls_made(),
    }))
}

async fn schedule_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.schedule.schedule(Utc::now()).await {
        Ok(games) => (
            StatusCode::OK,
            Json(json!({ "success": true, "schedule": games })),
        ),
        Err(e) => {
            error!("Schedule request failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "internal server error" })),
            )
        }
    }
}

async fn market_handler(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.market.market_data(game_id).await {
        Ok(market) => (
            StatusCode::OK,
            Json(json!({ "success": true, "market": market })),
        ),
        Err(e) => {
            error!(game_id, "Market data request failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "internal server error" })),
            )
        }
    }
}

async fn predict_handler(
    State(state): State<AppState>,
    Path(game_id): Path<i64>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.predictor.predict(game_id).await {
        Ok(prediction) => (
            StatusCode::OK,
            Json(json!({ "success": true, "prediction": prediction })),
        ),
        Err(GridironError::GameNotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Game {} not found", id) })),
        ),
        Err(GridironError::TeamNotFound(team)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Team {} not found", team) })),
        ),
        // Incomplete data is an expected condition early in the week, not a
        // server fault.
        Err(GridironError::StatsUnavailable(detail)) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": detail })),
        ),
        Err(e) => {
            error!(game_id, "Prediction failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "internal server error" })),
            )
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridiron=info".parse().unwrap()),
        )
        .init();

    info!("NFL Prediction Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let listen_port = config.listen_port;

    let store = CacheStore::connect(&config.database_url).await?;
    let api = Arc::new(ApiClient::new(&config)?);

    let state = AppState {
        predictor: Arc::new(Predictor::new(api.clone(), store.clone())),
        schedule: Arc::new(ScheduleManager::new(api.clone(), store.clone())),
        market: Arc::new(OddsEngine::new(api.clone(), store)),
        api,
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/schedule", get(schedule_handler))
        .route("/predict/:game_id", get(predict_handler))
        .route("/market/:game_id", get(market_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", listen_port);
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
