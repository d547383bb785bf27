//! Runtime configuration
//!
//! Everything is read from the environment (after `.env` has been loaded by
//! the binaries). Every setting has a default; malformed numbers are errors.

use crate::error::AssistantError;
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub port: u16,
    pub session_timeout_minutes: u64,
    pub history_window: usize,
    pub qa_history_window: usize,
    pub negotiation_temperature: f32,
    pub negotiation_max_tokens: u32,
    pub qa_max_tokens: u32,
    pub external_call_timeout_secs: u64,
    pub sanction_letter_dir: PathBuf,
    pub customer_data_path: Option<PathBuf>,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            port: 8000,
            session_timeout_minutes: 30,
            history_window: 10,
            qa_history_window: 4,
            negotiation_temperature: 0.7,
            negotiation_max_tokens: 400,
            qa_max_tokens: 200,
            external_call_timeout_secs: 20,
            sanction_letter_dir: PathBuf::from("sanction_letters"),
            customer_data_path: None,
            database_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            port: parse_or("PORT", get("PORT").or_else(|| get("API_PORT")), defaults.port)?,
            session_timeout_minutes: parse_or(
                "SESSION_TIMEOUT_MINUTES",
                get("SESSION_TIMEOUT_MINUTES"),
                defaults.session_timeout_minutes,
            )?,
            history_window: parse_or("HISTORY_WINDOW", get("HISTORY_WINDOW"), defaults.history_window)?,
            qa_history_window: parse_or(
                "QA_HISTORY_WINDOW",
                get("QA_HISTORY_WINDOW"),
                defaults.qa_history_window,
            )?,
            negotiation_temperature: parse_or(
                "NEGOTIATION_TEMPERATURE",
                get("NEGOTIATION_TEMPERATURE"),
                defaults.negotiation_temperature,
            )?,
            negotiation_max_tokens: parse_or(
                "NEGOTIATION_MAX_TOKENS",
                get("NEGOTIATION_MAX_TOKENS"),
                defaults.negotiation_max_tokens,
            )?,
            qa_max_tokens: parse_or("QA_MAX_TOKENS", get("QA_MAX_TOKENS"), defaults.qa_max_tokens)?,
            external_call_timeout_secs: parse_or(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                get("EXTERNAL_CALL_TIMEOUT_SECS"),
                defaults.external_call_timeout_secs,
            )?,
            sanction_letter_dir: get("SANCTION_LETTER_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sanction_letter_dir),
            customer_data_path: get("CUSTOMER_DATA_PATH").map(PathBuf::from),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
        })
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| {
            AssistantError::ConfigError(format!("{} has an invalid value: {}", key, value))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.port, 8000);
        assert_eq!(config.history_window, 10);
        assert_eq!(config.qa_history_window, 4);
        assert_eq!(config.session_timeout(), Duration::from_secs(1800));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides_and_fallback_keys() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "abc"),
            ("API_PORT", "9090"),
            ("NEGOTIATION_TEMPERATURE", "0.4"),
            ("POSTGRES_URL", "postgres://localhost/loans"),
            ("SANCTION_LETTER_DIR", "/tmp/letters"),
        ]))
        .unwrap();

        assert_eq!(config.gemini_api_key.as_deref(), Some("abc"));
        assert_eq!(config.port, 9090);
        assert!((config.negotiation_temperature - 0.4).abs() < 1e-6);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/loans"));
        assert_eq!(config.sanction_letter_dir, PathBuf::from("/tmp/letters"));
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let result = AppConfig::from_lookup(lookup_from(&[("PORT", "eighty")]));
        assert!(matches!(result, Err(AssistantError::ConfigError(_))));
    }
}
