use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Every setting has a default, so the only failure is a value that is set
/// but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

fn invalid(var: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { var, reason }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub ollama_host: String,
    pub model: String,
    pub log_level: Level,
    pub log_file: PathBuf,
    pub sessions_dir: PathBuf,
    pub prompts_path: Option<PathBuf>,
    pub generation_attempts: u32,
    pub generation_timeout: Option<Duration>,
    pub game_config_path: Option<PathBuf>,
}

fn optional_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let ollama_host = std::env::var("OLLAMA_HOST")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        if !ollama_host.starts_with("http://") && !ollama_host.starts_with("https://") {
            return Err(invalid(
                "OLLAMA_HOST",
                format!("'{}' is not an http(s) URL", ollama_host),
            ));
        }

        let model = std::env::var("QUIZ_MODEL").unwrap_or_else(|_| "llama3.2".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            invalid("RUST_LOG", format!("'{}' is not a valid log level", log_level_str))
        })?;

        let log_file = optional_path("LOG_FILE")
            .unwrap_or_else(|| PathBuf::from("millionaire_game.log"));
        let sessions_dir = optional_path("SESSIONS_DIR").unwrap_or_else(|| PathBuf::from("."));
        let prompts_path = optional_path("PROMPTS_PATH");
        let game_config_path = optional_path("GAME_CONFIG_PATH");

        let attempts_str = std::env::var("GENERATION_ATTEMPTS").unwrap_or_else(|_| "3".to_string());
        let generation_attempts = match attempts_str.trim().parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                return Err(invalid(
                    "GENERATION_ATTEMPTS",
                    format!("'{}' is not a positive whole number", attempts_str),
                ));
            }
        };

        let generation_timeout = match std::env::var("GENERATION_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    return Err(invalid(
                        "GENERATION_TIMEOUT_SECS",
                        format!("'{}' is not a positive number of seconds", raw),
                    ));
                }
            },
            Err(_) => None,
        };

        Ok(Self {
            ollama_host,
            model,
            log_level,
            log_file,
            sessions_dir,
            prompts_path,
            generation_attempts,
            generation_timeout,
            game_config_path,
        })
    }
}

/// Loads prompt templates from a directory, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = std::fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("OLLAMA_HOST");
            env::remove_var("QUIZ_MODEL");
            env::remove_var("RUST_LOG");
            env::remove_var("LOG_FILE");
            env::remove_var("SESSIONS_DIR");
            env::remove_var("PROMPTS_PATH");
            env::remove_var("GENERATION_ATTEMPTS");
            env::remove_var("GENERATION_TIMEOUT_SECS");
            env::remove_var("GAME_CONFIG_PATH");
        }
    }

    #[test]
    #[serial]
    fn test_config_error_display() {
        clear_env_vars();
        unsafe {
            env::set_var("GENERATION_ATTEMPTS", "many");
        }

        let err = Config::from_env().unwrap_err();
        assert_eq!(
            format!("{}", err),
            "Invalid value for GENERATION_ATTEMPTS: 'many' is not a positive whole number"
        );
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().unwrap();
        assert_eq!(config.ollama_host, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.log_file, PathBuf::from("millionaire_game.log"));
        assert_eq!(config.sessions_dir, PathBuf::from("."));
        assert_eq!(config.prompts_path, None);
        assert_eq!(config.generation_attempts, 3);
        assert_eq!(config.generation_timeout, None);
        assert_eq!(config.game_config_path, None);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("OLLAMA_HOST", "http://gpu-box:11434");
            env::set_var("QUIZ_MODEL", "mistral");
            env::set_var("RUST_LOG", "debug");
            env::set_var("SESSIONS_DIR", "/tmp/sessions");
            env::set_var("GENERATION_ATTEMPTS", "5");
            env::set_var("GENERATION_TIMEOUT_SECS", "30");
            env::set_var("GAME_CONFIG_PATH", "game.json");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.ollama_host, "http://gpu-box:11434");
        assert_eq!(config.model, "mistral");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.generation_attempts, 5);
        assert_eq!(config.generation_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.game_config_path, Some(PathBuf::from("game.json")));

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue { var, .. } = err;
        assert_eq!(var, "RUST_LOG");
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_attempts() {
        clear_env_vars();
        unsafe {
            env::set_var("GENERATION_ATTEMPTS", "0");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue { var, .. } = err;
        assert_eq!(var, "GENERATION_ATTEMPTS");
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_timeout() {
        clear_env_vars();
        unsafe {
            env::set_var("GENERATION_TIMEOUT_SECS", "0");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue { var, .. } = err;
        assert_eq!(var, "GENERATION_TIMEOUT_SECS");
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_rejects_non_http_host() {
        clear_env_vars();
        unsafe {
            env::set_var("OLLAMA_HOST", "localhost:11434");
        }

        let err = Config::from_env().unwrap_err();
        let ConfigError::InvalidValue { var, .. } = err;
        assert_eq!(var, "OLLAMA_HOST");
        clear_env_vars();
    }

    #[test]
    fn test_load_prompts_reads_markdown_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("generate_question.md"), "Ask about {topic}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let prompts = load_prompts(dir.path()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts["generate_question"], "Ask about {topic}");
    }
}
