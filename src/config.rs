use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::error::AppError;

pub const DEFAULT_MODEL_PATH: &str = "bosonai/higgs-audio-v2-generation-3B-base";
pub const DEFAULT_TOKENIZER_PATH: &str = "bosonai/higgs-audio-v2-tokenizer";
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_WORKER_SCRIPT: &str = "scripts/higgs_worker.py";

/// Compute device requested for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelection {
    /// Use an accelerator when one is available, otherwise the CPU.
    Auto,
    /// A device name handed to the engine as-is (`cpu`, `cuda`, `cuda:1`, ...).
    Named(String),
}

impl DeviceSelection {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("auto") {
            DeviceSelection::Auto
        } else {
            DeviceSelection::Named(raw.to_string())
        }
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelection::Auto => f.write_str("auto"),
            DeviceSelection::Named(name) => f.write_str(name),
        }
    }
}

/// Everything needed to construct the engine. Never mutated after startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_path: String,
    pub tokenizer_path: String,
    pub device: DeviceSelection,
    pub python: String,
    pub worker_script: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Empty
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = match var("HIGGS_HOST") {
            Some(raw) => raw.trim().parse::<IpAddr>().map_err(|_| {
                AppError::Configuration(format!("HIGGS_HOST must be an IP address, got '{}'", raw))
            })?,
            None => DEFAULT_HOST,
        };

        let port = match var("HIGGS_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                AppError::Configuration(format!("HIGGS_PORT must be a port number, got '{}'", raw))
            })?,
            None => DEFAULT_PORT,
        };

        let engine = EngineConfig {
            model_path: var("HIGGS_MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            tokenizer_path: var("HIGGS_TOKENIZER_PATH")
                .unwrap_or_else(|| DEFAULT_TOKENIZER_PATH.to_string()),
            device: var("HIGGS_DEVICE")
                .map(|raw| DeviceSelection::parse(raw.trim()))
                .unwrap_or(DeviceSelection::Auto),
            python: var("HIGGS_PYTHON").unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            worker_script: var("HIGGS_WORKER_SCRIPT")
                .unwrap_or_else(|| DEFAULT_WORKER_SCRIPT.to_string())
                .into(),
        };

        Ok(Self { host, port, engine })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServerConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8000");
        assert_eq!(config.engine.model_path, DEFAULT_MODEL_PATH);
        assert_eq!(config.engine.tokenizer_path, DEFAULT_TOKENIZER_PATH);
        assert_eq!(config.engine.device, DeviceSelection::Auto);
        assert_eq!(config.engine.python, "python3");
        assert_eq!(
            config.engine.worker_script,
            PathBuf::from("scripts/higgs_worker.py")
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HIGGS_MODEL_PATH", "/models/higgs"),
            ("HIGGS_TOKENIZER_PATH", "/models/tokenizer"),
            ("HIGGS_DEVICE", "cuda:1"),
            ("HIGGS_PORT", "9100"),
            ("HIGGS_HOST", "127.0.0.1"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9100");
        assert_eq!(config.engine.model_path, "/models/higgs");
        assert_eq!(config.engine.tokenizer_path, "/models/tokenizer");
        assert_eq!(
            config.engine.device,
            DeviceSelection::Named("cuda:1".to_string())
        );
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = config_from(&[("HIGGS_PORT", ""), ("HIGGS_DEVICE", "  ")]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.engine.device, DeviceSelection::Auto);
    }

    #[test]
    fn test_invalid_port_is_configuration_failure() {
        let err = config_from(&[("HIGGS_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("HIGGS_PORT"));
    }

    #[test]
    fn test_device_parse() {
        assert_eq!(DeviceSelection::parse("AUTO"), DeviceSelection::Auto);
        assert_eq!(DeviceSelection::parse("cpu").to_string(), "cpu");
    }
}
