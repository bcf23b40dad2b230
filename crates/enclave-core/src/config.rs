use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

const CONFIG_DIR: &str = "enclave-chat";

/// Which set of hosts the client talks to when no URL is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    #[default]
    Development,
    Production,
}

impl Deployment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Deployment::Development => "development",
            Deployment::Production => "production",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Some(Deployment::Development),
            "prod" | "production" => Some(Deployment::Production),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub deployment: Deployment,
    /// Key lifecycle service, e.g. `http://localhost:8501/api`
    pub control_plane_url: Option<String>,
    /// Hosts `encrypt_prompt` and `decrypt_response`
    pub crypto_url: Option<String>,
    /// Hosts `generate_text`
    pub tee_url: Option<String>,
    /// No timeout when unset; a hung call keeps the turn loading.
    pub request_timeout_secs: Option<u64>,
    /// When set, chat is only admitted once Key A and Key B have reached the TEE.
    /// Off by default: the chat box accepts prompts from the start.
    pub require_key_setup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Fully resolved service addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub control_plane: String,
    pub crypto: String,
    pub tee: String,
}

impl Config {
    pub fn new() -> Self {
        Self {
            deployment: Deployment::Development,
            control_plane_url: None,
            crypto_url: None,
            tee_url: None,
            request_timeout_secs: None,
            require_key_setup: false,
        }
    }

    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Environment variables win over the file. The lookup is injected so
    /// tests don't have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(deployment) = lookup("ENCLAVE_CHAT_DEPLOYMENT").and_then(|d| Deployment::parse(&d)) {
            self.deployment = deployment;
        }
        if let Some(url) = lookup("ENCLAVE_CHAT_CONTROL_URL") {
            self.control_plane_url = Some(url);
        }
        if let Some(url) = lookup("ENCLAVE_CHAT_CRYPTO_URL") {
            self.crypto_url = Some(url);
        }
        if let Some(url) = lookup("ENCLAVE_CHAT_TEE_URL") {
            self.tee_url = Some(url);
        }
    }

    /// Resolve the three service base URLs. Development falls back to the
    /// local ports the services listen on; production must be explicit.
    pub fn endpoints(&self) -> Result<Endpoints> {
        let pick = |configured: &Option<String>, dev_default: &str, name: &str| -> Result<String> {
            match (configured, self.deployment) {
                (Some(url), _) => Ok(url.trim_end_matches('/').to_string()),
                (None, Deployment::Development) => Ok(dev_default.to_string()),
                (None, Deployment::Production) => {
                    Err(anyhow!("production deployment requires {} to be configured", name))
                }
            }
        };

        Ok(Endpoints {
            control_plane: pick(&self.control_plane_url, "http://localhost:8501/api", "control_plane_url")?,
            crypto: pick(&self.crypto_url, "http://localhost:8080/api", "crypto_url")?,
            tee: pick(&self.tee_url, "http://localhost:5000", "tee_url")?,
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(CONFIG_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert!(!config.require_key_setup);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.deployment = Deployment::Production;
        config.control_plane_url = Some("http://10.0.0.1:8501/api".to_string());
        config.request_timeout_secs = Some(30);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"tee_url": "http://tee:5000"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.tee_url.as_deref(), Some("http://tee:5000"));
        assert_eq!(config.deployment, Deployment::Development);
        assert!(!config.require_key_setup);
    }

    #[test]
    fn test_key_gate_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"require_key_setup": true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.require_key_setup);
    }

    #[test]
    fn test_development_defaults_to_localhost() {
        let endpoints = Config::new().endpoints().unwrap();
        assert_eq!(endpoints.control_plane, "http://localhost:8501/api");
        assert_eq!(endpoints.crypto, "http://localhost:8080/api");
        assert_eq!(endpoints.tee, "http://localhost:5000");
    }

    #[test]
    fn test_production_requires_urls() {
        let mut config = Config::new();
        config.deployment = Deployment::Production;
        let err = config.endpoints().unwrap_err();
        assert!(err.to_string().contains("control_plane_url"));

        config.control_plane_url = Some("http://cp/api/".to_string());
        config.crypto_url = Some("http://crypto/api".to_string());
        config.tee_url = Some("http://tee".to_string());
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.control_plane, "http://cp/api");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ENCLAVE_CHAT_DEPLOYMENT", "prod"),
            ("ENCLAVE_CHAT_TEE_URL", "http://tee:5000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::new();
        config.tee_url = Some("http://old".to_string());
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.deployment, Deployment::Production);
        assert_eq!(config.tee_url.as_deref(), Some("http://tee:5000"));
        assert_eq!(config.crypto_url, None);
    }

    #[test]
    fn test_deployment_parse() {
        assert_eq!(Deployment::parse("DEV"), Some(Deployment::Development));
        assert_eq!(Deployment::parse("production"), Some(Deployment::Production));
        assert_eq!(Deployment::parse("staging"), None);
    }
}
