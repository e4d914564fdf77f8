use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Decimal places of the single configured currency
    #[serde(default = "default_decimals")]
    pub currency_decimals: u32,
    /// Accounts opened at startup if missing (demo bootstrap)
    #[serde(default)]
    pub seed_accounts: Vec<SeedAccount>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout; a transfer that cannot take its locks in time
    /// is abandoned before any mutation
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
    /// fsync every journal/log append before acknowledging
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/bank".to_string(),
            sync_writes: true,
        }
    }
}

/// Demo account opened at startup when absent.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeedAccount {
    pub account_no: String,
    pub owner: String,
    #[serde(default)]
    pub email: Option<String>,
    pub routing: String,
    /// Opening balance as a decimal string (e.g. "1000.00")
    pub balance: String,
}

fn default_decimals() -> u32 {
    2
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }

    /// Minimal config over a scratch directory.
    #[cfg(test)]
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            log_level: "debug".to_string(),
            log_dir: dir.join("logs").to_string_lossy().into_owned(),
            log_file: "qxp_bank.log".to_string(),
            use_json: false,
            rotation: "never".to_string(),
            enable_tracing: true,
            gateway: GatewayConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                request_timeout_ms: 5000,
            },
            storage: StorageConfig {
                data_dir: dir.to_string_lossy().into_owned(),
                sync_writes: false,
            },
            currency_decimals: 2,
            seed_accounts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: qxp_bank.log
use_json: false
rotation: daily
enable_tracing: true
gateway:
  host: 127.0.0.1
  port: 8080
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gateway.port, 8080);
        // Defaulted sections
        assert_eq!(config.storage.data_dir, "./data/bank");
        assert!(config.storage.sync_writes);
        assert_eq!(config.currency_decimals, 2);
        assert_eq!(config.gateway.request_timeout_ms, 5000);
        assert!(config.seed_accounts.is_empty());
    }

    #[test]
    fn test_parse_seed_accounts() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: qxp_bank.log
use_json: false
rotation: daily
enable_tracing: true
gateway:
  host: 127.0.0.1
  port: 8080
seed_accounts:
  - account_no: "ACC-1001"
    owner: "Asha Verma"
    email: "asha@example.com"
    routing: "QXPB0001234"
    balance: "1000.00"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.seed_accounts.len(), 1);
        assert_eq!(config.seed_accounts[0].account_no, "ACC-1001");
        assert_eq!(config.seed_accounts[0].balance, "1000.00");
    }
}
