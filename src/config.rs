use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::ethereum::utils;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    pub artifact: ArtifactConfig,
    pub contract: ContractConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub gas_limit: Option<u64>,
    /// Ether amount below which the first account is reported as underfunded
    pub low_balance_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub path: PathBuf,
    pub network_id: String,
}

/// Names of the contract members the OTP workflow drives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub generate_method: String,
    pub validate_method: String,
    pub generated_event: String,
    pub otp_field: String,
    pub validated_event: String,
    pub result_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub message: String,
    /// Zero disables the bound
    pub timeout_secs: u64,
}

impl PromptConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                gas_limit: None,
                low_balance_warning: None,
            },
            artifact: ArtifactConfig {
                path: PathBuf::from("build/contracts/OTPAuthentication.json"),
                network_id: "1664".to_string(),
            },
            contract: ContractConfig {
                generate_method: "generateOTP".to_string(),
                validate_method: "validateOTP".to_string(),
                generated_event: "OTPGenerated".to_string(),
                otp_field: "otp".to_string(),
                validated_event: "OTPValidated".to_string(),
                result_field: "isValid".to_string(),
            },
            prompt: PromptConfig {
                message: "Please enter the OTP to validate: ".to_string(),
                timeout_secs: 300,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    fn apply_env_vars(&mut self) {
        if let Ok(rpc_url) = std::env::var("OTP_DEMO_RPC_URL") {
            tracing::info!("Using OTP_DEMO_RPC_URL environment variable for the RPC endpoint");
            self.chain.rpc_url = rpc_url;
        }

        if let Ok(artifact) = std::env::var("OTP_DEMO_ARTIFACT") {
            tracing::info!("Using OTP_DEMO_ARTIFACT environment variable for the artifact path");
            self.artifact.path = PathBuf::from(artifact);
        }
    }

    /// Reject configurations the workflow cannot run with
    pub fn validate(&self) -> Result<()> {
        self.chain
            .rpc_url
            .parse::<alloy::transports::http::reqwest::Url>()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", self.chain.rpc_url, e))?;

        if self.artifact.network_id.trim().is_empty() {
            return Err(anyhow!("artifact.network_id cannot be empty"));
        }

        // Names are looked up in the ABI later, catch typos here
        let contract = &self.contract;
        for (key, name) in [
            ("contract.generate_method", &contract.generate_method),
            ("contract.validate_method", &contract.validate_method),
            ("contract.generated_event", &contract.generated_event),
            ("contract.otp_field", &contract.otp_field),
            ("contract.validated_event", &contract.validated_event),
            ("contract.result_field", &contract.result_field),
        ] {
            utils::validate_identifier(name).map_err(|e| anyhow!("{}: {}", key, e))?;
        }

        if let Some(threshold) = &self.chain.low_balance_warning {
            utils::parse_ether_display(threshold)
                .map_err(|e| anyhow!("chain.low_balance_warning: {}", e))?;
        }

        Ok(())
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("otp-auth-demo").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> Result<String> {
        let body = toml::to_string_pretty(&Self::default())
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        Ok(format!(
            "# OTP authentication demo configuration\n\
             #\n\
             # Optional keys:\n\
             #   chain.gas_limit = 300000\n\
             #   chain.low_balance_warning = \"0.01\"   # ether\n\
             #\n\
             # Environment overrides: OTP_DEMO_RPC_URL, OTP_DEMO_ARTIFACT\n\n{}",
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_target_local_development_node() {
        let config = Config::default();

        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.artifact.network_id, "1664");
        assert_eq!(config.contract.generated_event, "OTPGenerated");
        assert_eq!(config.prompt.timeout(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables_bound() {
        let prompt = PromptConfig {
            message: "> ".to_string(),
            timeout_secs: 0,
        };
        assert_eq!(prompt.timeout(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.contract.validate_method = "validate-otp".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chain.rpc_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chain.low_balance_warning = Some("a lot".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chain.low_balance_warning = Some("-0.01".to_string());
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_sample_config_parses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, Config::generate_sample().unwrap()).unwrap();

        let config = Config::load_from_file(&path).await.unwrap();
        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.contract.result_field, "isValid");
    }

    #[tokio::test]
    async fn test_load_from_file_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[chain]
rpc_url = "http://10.0.0.5:7545"
gas_limit = 250000

[artifact]
path = "artifacts/OTP.json"
network_id = "5777"

[contract]
generate_method = "issue"
validate_method = "check"
generated_event = "Issued"
otp_field = "code"
validated_event = "Checked"
result_field = "ok"

[prompt]
message = "OTP? "
timeout_secs = 0
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).await.unwrap();
        assert_eq!(config.chain.gas_limit, Some(250000));
        assert_eq!(config.artifact.network_id, "5777");
        assert_eq!(config.contract.otp_field, "code");
        assert_eq!(config.prompt.timeout(), None);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(Some(dir.path().join("absent.toml"))).await;
        assert_eq!(config.contract.generate_method, "generateOTP");
    }
}
