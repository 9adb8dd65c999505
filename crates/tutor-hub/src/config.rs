use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::model_registry::ModelDefaults;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_root: PathBuf,
    pub models_config_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub llm_base_url: String,
    pub openai_api_key: Option<String>,
    pub default_llm_model: String,
    pub default_tts_model: String,
    pub default_tts_voice: String,
    pub generate_timeout_seconds: u64,
    pub stream_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            data_root: PathBuf::from(var("DATA_ROOT", "conversation_data")),
            models_config_path: PathBuf::from(var("MODELS_CONFIG_PATH", "config/models.json")),
            api_host: var("API_HOST", "127.0.0.1"),
            api_port: parse_var("API_PORT", &var("API_PORT", "8000"))?,
            llm_base_url: var("LLM_BASE_URL", "https://api.openai.com/v1"),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            default_llm_model: var("DEFAULT_LLM_MODEL", "gpt-5-mini"),
            default_tts_model: var("DEFAULT_TTS_MODEL", "tts-1"),
            default_tts_voice: var("DEFAULT_TTS_VOICE", "alloy"),
            generate_timeout_seconds: parse_var(
                "GENERATE_TIMEOUT_SECONDS",
                &var("GENERATE_TIMEOUT_SECONDS", "120"),
            )?,
            stream_timeout_seconds: parse_var(
                "STREAM_TIMEOUT_SECONDS",
                &var("STREAM_TIMEOUT_SECONDS", "600"),
            )?,
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Data Root: {}", self.data_root.display());
        info!("- Models Config: {}", self.models_config_path.display());
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- LLM Provider: {}", self.llm_base_url);
        info!("- API Key: {}", if self.openai_api_key.is_some() { "set" } else { "NOT SET" });
        info!(
            "- Default Models: llm={}, tts={}, voice={}",
            self.default_llm_model, self.default_tts_model, self.default_tts_voice
        );
        info!("- Generate Timeout: {}s", self.generate_timeout_seconds);
        info!("- Stream Timeout: {}s", self.stream_timeout_seconds);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_seconds)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_seconds)
    }

    pub fn model_defaults(&self) -> ModelDefaults {
        ModelDefaults {
            llm: self.default_llm_model.clone(),
            tts: self.default_tts_model.clone(),
            tts_voice: self.default_tts_voice.clone(),
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a number, got '{}'", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Helper function to create a test Config with default values
    fn create_test_config() -> Config {
        Config {
            data_root: PathBuf::from("/tmp/tutor-data"),
            models_config_path: PathBuf::from("/tmp/models.json"),
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            llm_base_url: "http://127.0.0.1:9999/v1".to_string(),
            openai_api_key: Some("test-key".to_string()),
            default_llm_model: "gpt-5-mini".to_string(),
            default_tts_model: "tts-1".to_string(),
            default_tts_voice: "alloy".to_string(),
            generate_timeout_seconds: 120,
            stream_timeout_seconds: 600,
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.data_root, PathBuf::from("conversation_data"));
        assert_eq!(config.models_config_path, PathBuf::from("config/models.json"));
        assert_eq!(config.api_port, 8000);
        assert_eq!(config.llm_base_url, "https://api.openai.com/v1");
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.generate_timeout_seconds, 120);
        assert_eq!(config.stream_timeout_seconds, 600);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATA_ROOT", "/srv/tutor"),
            ("API_PORT", "9100"),
            ("OPENAI_API_KEY", "sk-abc"),
            ("DEFAULT_TTS_VOICE", "nova"),
        ]))
        .unwrap();
        assert_eq!(config.data_root, PathBuf::from("/srv/tutor"));
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-abc"));
        assert_eq!(config.model_defaults().tts_voice, "nova");
    }

    #[test]
    fn test_blank_api_key_counts_as_unset() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "  ")])).unwrap();
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_malformed_numbers_are_errors() {
        let err = Config::from_lookup(lookup_from(&[("API_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("API_PORT"));

        assert!(Config::from_lookup(lookup_from(&[("STREAM_TIMEOUT_SECONDS", "-1")])).is_err());
    }

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_rejects_hostnames() {
        let mut config = create_test_config();
        config.api_host = "not an ip".to_string();
        assert!(config.api_addr().is_err());
    }

    #[test]
    fn test_timeouts_convert_to_durations() {
        let config = create_test_config();
        assert_eq!(config.generate_timeout(), Duration::from_secs(120));
        assert!(config.stream_timeout() > config.generate_timeout());
    }
}
