//! Configuration file support.
//!
//! Loads config from ~/.sqltutor/config.toml. Resolution order is CLI args >
//! env vars > config file > defaults; the merging happens in `main`.

use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PROVIDER: &str = "deepseek";

/// Providers the backend accepts for explanations.
pub const PROVIDERS: &[&str] = &["deepseek", "qwen"];

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Backend base URL
    pub base_url: Option<String>,

    /// Bearer token for the tutoring service
    pub token: Option<String>,

    /// Default LLM provider for explanations
    pub provider: Option<String>,

    /// Whether explains are followed by a personalized recommendation
    pub personalize: Option<bool>,
}

impl Config {
    /// Load config from ~/.sqltutor/config.toml
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    fn load_from(path: &PathBuf) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory holding config and REPL history
pub fn config_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".sqltutor")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.base_url.is_none());
        assert!(config.token.is_none());
        assert!(config.provider.is_none());
        assert!(config.personalize.is_none());
    }

    #[test]
    fn test_config_path() {
        let path = config_path();
        assert!(path.to_string_lossy().contains(".sqltutor"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "base_url = \"http://tutor.local:9000\"").unwrap();
        writeln!(file, "provider = \"qwen\"").unwrap();
        writeln!(file, "personalize = true").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.base_url.as_deref(), Some("http://tutor.local:9000"));
        assert_eq!(config.provider.as_deref(), Some("qwen"));
        assert_eq!(config.personalize, Some(true));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_load_from_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml"));
        assert!(config.base_url.is_none());
    }
}
