//! Classifier adapters.
//!
//! The orchestrator only sees [`Classifier`]. Two backends exist: a logistic
//! model read from a JSON file at startup, and a remote model-serving endpoint.

use std::{future::Future, path::Path, time::Duration};

use derive_more::From;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
    error::Error,
    features::{FeatureVector, FEATURE_COUNT},
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub is_phishing: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
}

pub trait Classifier: Send + Sync {
    /// Errors are reported as [`Error::ClassifierUnavailable`].
    fn predict(&self, features: &FeatureVector) -> impl Future<Output = Result<Prediction>> + Send;
}

fn default_threshold() -> f64 {
    0.5
}

/// `sigmoid(weights . features + bias) >= threshold` means phishing.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    weights: Vec<f64>,
    bias: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

impl LinearModel {
    /// Arity is checked here so a mismatched model never reaches a request.
    pub fn new(weights: Vec<f64>, bias: f64, threshold: f64) -> Result<Self> {
        if weights.len() != FEATURE_COUNT {
            return Err(Error::ModelLoad(format!(
                "model expects {} features, extractor produces {FEATURE_COUNT}",
                weights.len()
            )));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::ModelLoad(format!("threshold {threshold} outside [0, 1]")));
        }
        Ok(Self { weights, bias, threshold })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let raw: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::ModelLoad(format!("{}: {e}", path.display())))?;
        let model = Self::new(raw.weights, raw.bias, raw.threshold)?;
        info!(path = %path.display(), threshold = model.threshold, "linear model loaded");
        Ok(model)
    }

    fn score(&self, features: &FeatureVector) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(features.as_slice())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }
}

impl Classifier for LinearModel {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        let p = self.score(features);
        if !p.is_finite() {
            return Err(Error::classifier("non-finite score"));
        }
        let is_phishing = p >= self.threshold;
        Ok(Prediction {
            is_phishing,
            confidence: Some(if is_phishing { p } else { 1.0 - p }),
        })
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a [f64],
}

/// Posts `{"features": [...]}` and expects a [`Prediction`] back.
pub struct RemoteModel {
    http_client: Client,
    endpoint: Url,
}

impl RemoteModel {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::custom(format!("HTTP client init error: {}", e)))?;
        Ok(Self { http_client, endpoint })
    }
}

impl Classifier for RemoteModel {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        debug!(endpoint = %self.endpoint, "remote prediction");
        let resp = self
            .http_client
            .post(self.endpoint.clone())
            .json(&PredictRequest { features: features.as_slice() })
            .send()
            .await
            .map_err(|e| Error::classifier(format!("Request error: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::classifier(format!("Model server error: {}", e)))?;

        resp.json::<Prediction>()
            .await
            .map_err(|e| Error::classifier(format!("JSON parse error: {}", e)))
    }
}

#[derive(From)]
pub enum Model {
    Linear(LinearModel),
    Remote(RemoteModel),
}

impl Classifier for Model {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        match self {
            Model::Linear(model) => model.predict(features).await,
            Model::Remote(model) => model.predict(features).await,
        }
    }
}
