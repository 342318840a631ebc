use calc_queue_client::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub broker_address: String,
    /// Base for status urls when a request carries no Host header
    pub public_url: String,
    /// Pause between status polls while a request waits for its task
    pub poll_interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
            broker_address: "127.0.0.1:6380".to_string(),
            public_url: "http://localhost:5000/".to_string(),
            poll_interval_ms: 100,
        }
    }
}

impl ApiConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ApiConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            broker_address: self.broker_address.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// `public_url` with exactly one trailing slash
    pub fn base_url(&self) -> String {
        format!("{}/", self.public_url.trim_end_matches('/'))
    }
}
