use alloy::{json_abi::JsonAbi, primitives::Address};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{OtpError, Result};
use crate::ethereum::utils;

/// Deployed contract handle read from a Truffle build artifact
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub contract_name: Option<String>,
    pub network_id: String,
    pub address: Address,
    pub abi: JsonAbi,
}

impl ContractArtifact {
    /// Load the artifact at `path` and resolve the deployment for `network_id`
    pub async fn load<P: AsRef<Path>>(path: P, network_id: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OtpError::ArtifactNotFound(path.to_path_buf())
            } else {
                OtpError::Io(e)
            }
        })?;

        let artifact = Self::from_json(&content, network_id)?;
        info!(
            "Loaded artifact {} deployed at {} on network {}",
            artifact.display_name(),
            artifact.address,
            artifact.network_id
        );
        Ok(artifact)
    }

    /// Parse an artifact document already in memory
    pub fn from_json(content: &str, network_id: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(content)
            .map_err(|e| OtpError::ArtifactMalformed(format!("invalid JSON: {}", e)))?;

        let abi_value = document
            .get("abi")
            .ok_or_else(|| OtpError::ArtifactMalformed("missing 'abi' field".to_string()))?;
        let abi: JsonAbi = serde_json::from_value(abi_value.clone())
            .map_err(|e| OtpError::ArtifactMalformed(format!("invalid ABI: {}", e)))?;

        // Truffle keys deployments by network id
        let networks = document
            .get("networks")
            .and_then(Value::as_object)
            .ok_or_else(|| OtpError::ArtifactMalformed("missing 'networks' object".to_string()))?;

        let deployment = networks.get(network_id).ok_or_else(|| {
            let known: Vec<&str> = networks.keys().map(String::as_str).collect();
            OtpError::ArtifactMalformed(format!(
                "no deployment for network id '{}' (available: [{}])",
                network_id,
                known.join(", ")
            ))
        })?;

        let address_str = deployment
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OtpError::ArtifactMalformed(format!(
                    "network '{}' has no deployed address",
                    network_id
                ))
            })?;
        let address = utils::validate_address(address_str)
            .map_err(|e| OtpError::ArtifactMalformed(e.to_string()))?;

        // Optional, only used in log lines
        let contract_name = document
            .get("contractName")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(
            "Artifact ABI has {} functions and {} events",
            abi.functions().count(),
            abi.events().count()
        );

        Ok(Self {
            contract_name,
            network_id: network_id.to_string(),
            address,
            abi,
        })
    }

    pub fn display_name(&self) -> &str {
        self.contract_name.as_deref().unwrap_or("<unnamed contract>")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::tempdir;

    pub(crate) const DEPLOYED_AT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    pub(crate) fn sample_artifact_json() -> String {
        serde_json::json!({
            "contractName": "OTPAuthentication",
            "abi": [
                {
                    "type": "function",
                    "name": "generateOTP",
                    "inputs": [],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                },
                {
                    "type": "function",
                    "name": "validateOTP",
                    "inputs": [{ "name": "_otp", "type": "uint256", "internalType": "uint256" }],
                    "outputs": [],
                    "stateMutability": "nonpayable"
                },
                {
                    "type": "event",
                    "name": "OTPGenerated",
                    "anonymous": false,
                    "inputs": [
                        { "name": "user", "type": "address", "indexed": true, "internalType": "address" },
                        { "name": "otp", "type": "uint256", "indexed": false, "internalType": "uint256" }
                    ]
                },
                {
                    "type": "event",
                    "name": "OTPValidated",
                    "anonymous": false,
                    "inputs": [
                        { "name": "user", "type": "address", "indexed": true, "internalType": "address" },
                        { "name": "isValid", "type": "bool", "indexed": false, "internalType": "bool" }
                    ]
                }
            ],
            "networks": {
                "1664": {
                    "events": {},
                    "links": {},
                    "address": DEPLOYED_AT,
                    "transactionHash": "0x8f2d6a0c6bd1ab3c1a8fb5ff0ee0d5ab0b8d1fb6a4a1fbb8e2cd18d8a0e7e3f1"
                }
            }
        })
        .to_string()
    }

    pub(crate) fn sample_artifact() -> ContractArtifact {
        ContractArtifact::from_json(&sample_artifact_json(), "1664").unwrap()
    }

    #[test]
    fn test_loads_matching_network_entry() {
        let artifact = sample_artifact();

        assert_eq!(artifact.address, Address::from_str(DEPLOYED_AT).unwrap());
        assert_eq!(artifact.network_id, "1664");
        assert_eq!(artifact.display_name(), "OTPAuthentication");
        assert_eq!(artifact.abi.functions().count(), 2);
        assert!(artifact.abi.function("validateOTP").is_some());
        assert!(artifact.abi.event("OTPGenerated").is_some());
    }

    #[test]
    fn test_missing_network_is_malformed() {
        let err = ContractArtifact::from_json(&sample_artifact_json(), "5777").unwrap_err();
        match err {
            OtpError::ArtifactMalformed(reason) => {
                assert!(reason.contains("5777"));
                assert!(reason.contains("1664"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_documents_are_malformed() {
        assert!(matches!(
            ContractArtifact::from_json("{ not json", "1664"),
            Err(OtpError::ArtifactMalformed(_))
        ));
        assert!(matches!(
            ContractArtifact::from_json(r#"{"networks": {}}"#, "1664"),
            Err(OtpError::ArtifactMalformed(_))
        ));

        let bad_address = r#"{"abi": [], "networks": {"1664": {"address": "0x1234"}}}"#;
        assert!(matches!(
            ContractArtifact::from_json(bad_address, "1664"),
            Err(OtpError::ArtifactMalformed(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("OTPAuthentication.json");
        std::fs::write(&path, sample_artifact_json()).unwrap();

        let artifact = ContractArtifact::load(&path, "1664").await.unwrap();
        assert_eq!(artifact.address, Address::from_str(DEPLOYED_AT).unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");

        match ContractArtifact::load(&path, "1664").await {
            Err(OtpError::ArtifactNotFound(reported)) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
