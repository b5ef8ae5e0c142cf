use std::fmt;
use std::path::PathBuf;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is missing.
    MissingVar(&'static str),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => {
                write!(f, "required environment variable {name} is not set")
            }
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process configuration, read from the environment.
#[derive(Debug)]
pub struct Config {
    /// Telegram bot token.
    pub bot_token: String,
    /// Path of the SQLite database file.
    pub database_path: PathBuf,
    /// Directory for log files.
    pub log_dir: PathBuf,
}

const TOKEN_VAR: &str = "TELOXIDE_TOKEN";
const DATABASE_VAR: &str = "DATABASE_PATH";
const LOG_DIR_VAR: &str = "LOG_DIR";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = get(TOKEN_VAR)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingVar("TELOXIDE_TOKEN"))?;

        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = bot_token.split(':').collect();
        if token_parts.len() != 2
            || token_parts[0].parse::<u64>().is_err()
            || token_parts[1].is_empty()
        {
            return Err(ConfigError::Validation(
                "TELOXIDE_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let database_path = get(DATABASE_VAR)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("shortcuts.db"));

        let log_dir = get(LOG_DIR_VAR)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));

        Ok(Self { bot_token, database_path, log_dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Config::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_valid_config() {
        let config = load(&[
            ("TELOXIDE_TOKEN", "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"),
            ("DATABASE_PATH", "/tmp/shortcuts.db"),
            ("LOG_DIR", "/tmp/logs"),
        ])
        .expect("should load valid config");

        assert_eq!(config.database_path, PathBuf::from("/tmp/shortcuts.db"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn test_paths_have_defaults() {
        let config = load(&[("TELOXIDE_TOKEN", "123456789:ABCdef")]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("shortcuts.db"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_missing_token() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("TELOXIDE_TOKEN")));
    }

    #[test]
    fn test_invalid_token_no_colon() {
        let err = load(&[("TELOXIDE_TOKEN", "invalid_token_no_colon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_token_non_numeric_id() {
        let err = load(&[("TELOXIDE_TOKEN", "notanumber:ABCdef")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_token_empty_secret() {
        let err = load(&[("TELOXIDE_TOKEN", "123456789:")]).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_token_is_trimmed() {
        let config = load(&[("TELOXIDE_TOKEN", " 123456789:ABCdef \n")]).unwrap();
        assert_eq!(config.bot_token, "123456789:ABCdef");
    }
}
