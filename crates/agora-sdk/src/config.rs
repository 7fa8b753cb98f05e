//! Configuration for Agora SDK clients

use crate::error::{Result, SdkError};
use agora_client::{ClientConfig, ANONYMIZE_HEADER};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgoraConfig {
    /// Base URL of the resource API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Server push endpoint; push is disabled when unset
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Session token for authenticated requests
    #[serde(default)]
    pub api_token: Option<String>,

    /// Where unauthenticated users are sent to log in
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Workflow state in which rating results are always shown
    #[serde(default = "default_result_state")]
    pub result_state: String,

    /// Request header an endpoint must accept for anonymized writes
    #[serde(default = "default_anonymize_header")]
    pub anonymize_header: String,

    /// Delay before the push channel reconnects, in seconds
    #[serde(default = "default_reconnect")]
    pub push_reconnect_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:6541".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_result_state() -> String {
    "result".to_string()
}

fn default_anonymize_header() -> String {
    ANONYMIZE_HEADER.to_string()
}

fn default_reconnect() -> u64 {
    5
}

impl Default for AgoraConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            websocket_url: None,
            timeout_secs: default_timeout(),
            api_token: None,
            login_path: default_login_path(),
            result_state: default_result_state(),
            anonymize_header: default_anonymize_header(),
            push_reconnect_secs: default_reconnect(),
        }
    }
}

impl AgoraConfig {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SdkError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        toml::from_str(&content).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| SdkError::Config(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Settings for the HTTP resource client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            api_token: self.api_token.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AgoraConfig = toml::from_str(
            r#"
            base_url = "https://agora.example.org/api"
            result_state = "evaluation"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://agora.example.org/api");
        assert_eq!(config.result_state, "evaluation");
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.anonymize_header, "X-Anonymize");
        assert!(config.websocket_url.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agora.toml");

        let config = AgoraConfig {
            websocket_url: Some("wss://agora.example.org/ws".into()),
            timeout_secs: 10,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = AgoraConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.client_config().timeout_secs, 10);
    }

    #[test]
    fn test_missing_file() {
        let err = AgoraConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }
}
