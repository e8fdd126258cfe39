use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// `host:port` of the phishcheck API.
    pub detector_address: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

pub fn read_config() -> Result<Config> {
    dotenv::dotenv().ok();
    let config_path = env::var(CONFIG_PATH_ENV)
        .with_context(|| format!("{CONFIG_PATH_ENV} environment variable not set"))?;
    let bytes = std::fs::read(&config_path).with_context(|| format!("cannot read {config_path}"))?;
    parse_config(&String::from_utf8_lossy(&bytes))
}

fn parse_config(raw: &str) -> Result<Config> {
    toml::from_str(raw).context("invalid bot config")
}
