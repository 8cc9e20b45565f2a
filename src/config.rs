use crate::domain::{parse_address, BasisPointRate, MinorUnitAmount, NumericDomain};
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Largest decimals value accepted for either numeric domain.
const MAX_DECIMALS: u8 = 36;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub ledger_rpc_url: String,
    pub registry_address: Address,
    pub signer_address: Address,
    pub numeric: NumericConfig,
    pub finalization: FinalizationConfig,
}

/// Decimal conventions of the two numeric domains and the fee cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericConfig {
    pub currency_decimals: u8,
    pub share_decimals: u8,
    pub max_fee_rate_bps: u16,
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            currency_decimals: 6,
            share_decimals: 18,
            max_fee_rate_bps: 5_000,
        }
    }
}

impl NumericConfig {
    pub fn currency(&self, raw: U256) -> MinorUnitAmount {
        MinorUnitAmount::new(raw, NumericDomain::Currency, self.currency_decimals)
    }

    pub fn shares(&self, raw: U256) -> MinorUnitAmount {
        MinorUnitAmount::new(raw, NumericDomain::ShareToken, self.share_decimals)
    }

    pub fn decimals_for(&self, domain: NumericDomain) -> u8 {
        match domain {
            NumericDomain::Currency => self.currency_decimals,
            NumericDomain::ShareToken => self.share_decimals,
        }
    }
}

/// How long to wait for a submitted write to finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizationConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(120_000),
            poll_interval: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn required_address(env_map: &HashMap<String, String>, key: &str) -> Result<Address, ConfigError> {
    let raw = required(env_map, key)?;
    parse_address(&raw).map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn decimals(env_map: &HashMap<String, String>, key: &str, default: &str) -> Result<u8, ConfigError> {
    let value = env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u8>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u8".to_string()))?;
    if value > MAX_DECIMALS {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be at most {}", MAX_DECIMALS),
        ));
    }
    Ok(value)
}

fn millis(env_map: &HashMap<String, String>, key: &str, default: &str) -> Result<Duration, ConfigError> {
    let value = env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string()))?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_millis(value))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let ledger_rpc_url = required(&env_map, "LEDGER_RPC_URL")?;
        let registry_address = required_address(&env_map, "REGISTRY_ADDRESS")?;
        let signer_address = required_address(&env_map, "SIGNER_ADDRESS")?;

        let currency_decimals = decimals(&env_map, "CURRENCY_DECIMALS", "6")?;
        let share_decimals = decimals(&env_map, "SHARE_DECIMALS", "18")?;

        let max_fee_rate_bps = env_map
            .get("MAX_FEE_RATE_BPS")
            .map(|s| s.as_str())
            .unwrap_or("5000")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MAX_FEE_RATE_BPS".to_string(),
                    "must be a valid u16".to_string(),
                )
            })?;
        if max_fee_rate_bps > BasisPointRate::MAX {
            return Err(ConfigError::InvalidValue(
                "MAX_FEE_RATE_BPS".to_string(),
                format!("must be at most {}", BasisPointRate::MAX),
            ));
        }

        let timeout = millis(&env_map, "FINALIZATION_TIMEOUT_MS", "120000")?;
        let poll_interval = millis(&env_map, "RECEIPT_POLL_INTERVAL_MS", "1000")?;
        if poll_interval > timeout {
            return Err(ConfigError::InvalidValue(
                "RECEIPT_POLL_INTERVAL_MS".to_string(),
                "must not exceed FINALIZATION_TIMEOUT_MS".to_string(),
            ));
        }

        Ok(Config {
            port,
            database_path,
            ledger_rpc_url,
            registry_address,
            signer_address,
            numeric: NumericConfig {
                currency_decimals,
                share_decimals,
                max_fee_rate_bps,
            },
            finalization: FinalizationConfig {
                timeout,
                poll_interval,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "LEDGER_RPC_URL".to_string(),
            "http://127.0.0.1:8545".to_string(),
        );
        map.insert(
            "REGISTRY_ADDRESS".to_string(),
            "0x00000000000000000000000000000000000000ee".to_string(),
        );
        map.insert(
            "SIGNER_ADDRESS".to_string(),
            "0x000000000000000000000000000000000000000e".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.numeric, NumericConfig::default());
        assert_eq!(config.finalization, FinalizationConfig::default());
        assert_eq!(config.registry_address, Address::from_low_u64_be(0xee));
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_ledger_rpc_url() {
        let mut env_map = setup_required_env();
        env_map.remove("LEDGER_RPC_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "LEDGER_RPC_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_signer_address() {
        let mut env_map = setup_required_env();
        env_map.remove("SIGNER_ADDRESS");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "SIGNER_ADDRESS"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_registry_address() {
        let mut env_map = setup_required_env();
        env_map.insert("REGISTRY_ADDRESS".to_string(), "0x1234".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "REGISTRY_ADDRESS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_fee_cap_above_ten_thousand() {
        let mut env_map = setup_required_env();
        env_map.insert("MAX_FEE_RATE_BPS".to_string(), "10001".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "MAX_FEE_RATE_BPS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_share_decimals() {
        let mut env_map = setup_required_env();
        env_map.insert("SHARE_DECIMALS".to_string(), "99".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "SHARE_DECIMALS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("FINALIZATION_TIMEOUT_MS".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "FINALIZATION_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_poll_interval_longer_than_timeout() {
        let mut env_map = setup_required_env();
        env_map.insert("FINALIZATION_TIMEOUT_MS".to_string(), "500".to_string());
        env_map.insert("RECEIPT_POLL_INTERVAL_MS".to_string(), "1000".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "RECEIPT_POLL_INTERVAL_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
