use calc_queue_backend::BackendConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub broker: NetworkConfig,
    pub backend: BackendConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Submissions are rejected once this many tasks are waiting
    pub queue_depth_threshold: usize,
    /// Period of the expired-result purge
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub prometheus_port: u16,
    pub log_level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "0.0.0.0".to_string(),
            port: 6380,
            queue_depth_threshold: 100_000,
            cleanup_interval_secs: 60,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            prometheus_port: 9091,
            log_level: "info".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.broker.host, self.broker.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_queue_backend::BackendKind;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "broker:\n  port: 7000\nbackend:\n  kind: rocksdb\n  data_dir: /tmp/cq\n  result_retention_secs: 60\n";
        let config: BrokerConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.broker.port, 7000);
        assert_eq!(config.broker.host, "0.0.0.0");
        assert_eq!(config.backend.kind, BackendKind::Rocksdb);
        assert_eq!(config.monitoring.prometheus_port, 9091);
        assert_eq!(config.listen_address(), "0.0.0.0:7000");
    }
}
