use std::sync::Arc;

use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::pipeline::ModelService;
use crate::types::{InputRecord, PredictionOutput, Subdivision};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ModelService>,
}

pub fn router(state: AppState) -> Router {
    // Permissive CORS so the Next.js frontend can call us directly.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/check-backend", get(check_backend))
        .route("/predict-rainfall/check-backend", get(check_backend))
        .route("/predict", post(predict))
        .route("/stats", get(stats))
        .route("/regional-data", post(regional_data))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Rainfall Prediction API for India" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn check_backend() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "rainfall-prediction-api" }))
}

async fn predict(
    State(state): State<AppState>,
    Json(record): Json<InputRecord>,
) -> Result<Json<PredictionOutput>, ApiError> {
    Ok(Json(state.service.predict(&record)?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state
        .service
        .dataset()
        .rainfall_statistics()
        .ok_or_else(|| ApiError::NotFound("no statistics available".into()))?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

#[derive(Debug, Deserialize)]
struct RegionalRequest {
    subdivision: Option<String>,
}

async fn regional_data(
    State(state): State<AppState>,
    Json(req): Json<RegionalRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = req
        .subdivision
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("subdivision is required".into()))?;
    let sub = Subdivision::parse(&name)
        .ok_or_else(|| ApiError::NotFound(format!("no data found for subdivision: {name}")))?;
    let data = state
        .service
        .dataset()
        .regional_data(sub)
        .ok_or_else(|| ApiError::NotFound(format!("no data found for subdivision: {name}")))?;
    Ok(Json(data))
}
