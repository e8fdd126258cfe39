use std::{path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::{
    certificate::CertificateOptions,
    detector::DetectorOptions,
    error::Error,
    model::{LinearModel, Model, RemoteModel},
    Result,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    File(PathBuf),
    Remote(Url),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub model: ModelSource,
    pub detector: DetectorOptions,
}

impl Config {
    /// `.env` is honoured if present; process environment wins.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model = match (get("MODEL_PATH"), get("MODEL_URL")) {
            (Some(path), _) => ModelSource::File(PathBuf::from(path)),
            (None, Some(url)) => ModelSource::Remote(
                Url::parse(&url).map_err(|e| Error::ParseError(format!("MODEL_URL: {e}")))?,
            ),
            (None, None) => return Err(Error::custom("env MODEL_PATH or MODEL_URL variable not found")),
        };

        let secs = |key: &str, default: u64| -> Result<Duration> {
            get(key)
                .map(|v| parse_num::<u64>(key, &v))
                .transpose()
                .map(|v| Duration::from_secs(v.unwrap_or(default)))
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            model,
            detector: DetectorOptions {
                certificate: CertificateOptions {
                    connect_timeout: secs("CONNECT_TIMEOUT_SECS", 5)?,
                    handshake_timeout: secs("HANDSHAKE_TIMEOUT_SECS", 5)?,
                    ..CertificateOptions::default()
                },
                request_timeout: secs("REQUEST_TIMEOUT_SECS", 10)?,
            },
        })
    }

    /// Loaded once at startup so a broken model never reaches the first request.
    pub fn load_model(&self) -> Result<Model> {
        Ok(match &self.model {
            ModelSource::File(path) => LinearModel::load(path)?.into(),
            ModelSource::Remote(url) => RemoteModel::new(url.clone(), self.detector.request_timeout)?.into(),
        })
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ParseError(format!("{key}: expected a number, got {value:?}")))
}
