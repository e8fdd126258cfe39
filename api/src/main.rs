use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State, response::IntoResponse, routing::{get, post}, Json, Router
};
use detector::PhishingDetector;
use model::Classifier;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use crate::error::Error;
pub type Result<T> = core::result::Result<T, Error>;

mod certificate;
mod config;
mod detector;
mod error;
mod features;
mod model;

#[derive(Deserialize)]
struct CheckRequest {
    url: String,
}

async fn health_route() -> impl IntoResponse{
    Json(json!({ "status": "ok" }))
}

async fn check_url_route<C: Classifier>(
    State(state): State<Arc<PhishingDetector<C>>>,
    Json(req): Json<CheckRequest>,
) -> Result<impl IntoResponse>{
    info!(url = %req.url, "new request");
    let result = state.classify(&req.url).await?;
    Ok(Json(result))
}

async fn analyze_route<C: Classifier>(
    State(state): State<Arc<PhishingDetector<C>>>,
    Json(req): Json<CheckRequest>,
) -> Result<impl IntoResponse>{
    let analysis = state.analyze(&req.url).await?;
    let features: Map<String, Value> = analysis
        .features
        .named()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect();
    Ok(Json(json!({
        "url": analysis.url,
        "features": features,
        "certificate": analysis.certificate,
        "is_phishing": analysis.prediction.is_phishing,
        "ssl_valid": analysis.certificate.is_trusted(),
        "confidence": analysis.prediction.confidence,
    })))
}

fn app<C: Classifier + 'static>(detector: Arc<PhishingDetector<C>>) -> Router {
    Router::new()
        .route("/", get(health_route))
        .route("/check_url", post(check_url_route::<C>))
        .route("/api/analyze", post(analyze_route::<C>))
        .with_state(detector)
}

#[tokio::main]
async fn main() -> anyhow::Result<()>{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
    let config = config::Config::from_env().context("invalid configuration")?;
    let model = config.load_model().context("failed to load classifier")?;
    let detector = Arc::new(PhishingDetector::new(model, config.detector));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app(detector)).await?;
    Ok(())
}
