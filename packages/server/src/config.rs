use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::domains::auth::{OAuthSettings, TokenPolicy};
use crate::domains::notify::telegram::TelegramOptions;
use crate::domains::sync::SyncConfig;
use crate::kernel::scheduler::SchedulerConfig;
use crate::kernel::secret::SecretString;
use crate::kernel::transport::TransportConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub hh_client_id: String,
    pub hh_client_secret: SecretString,
    pub hh_redirect_uri: String,
    pub hh_api_base: String,
    pub hh_oauth_base: String,
    pub bitrix_webhook_url: SecretString,
    pub telegram_bot_token: SecretString,
    pub telegram_chat_id: String,
    pub telegram_api_base: String,
    pub token_file: PathBuf,
    pub ledger_file: PathBuf,
    pub log_file: PathBuf,
    pub sync_interval: Duration,
    pub min_request_interval: Duration,
    pub event_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("{key} must be a valid number")),
                None => Ok(default),
            }
        };

        Ok(Self {
            hh_client_id: required("HH_CLIENT_ID")?,
            hh_client_secret: required("HH_CLIENT_SECRET")?.into(),
            hh_redirect_uri: or("HH_REDIRECT_URI", "http://localhost:8000/callback"),
            hh_api_base: or("HH_API_BASE", "https://api.hh.ru"),
            hh_oauth_base: or("HH_OAUTH_BASE", "https://hh.ru"),
            bitrix_webhook_url: required("BITRIX_WEBHOOK_URL")?.into(),
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?.into(),
            telegram_chat_id: required("TELEGRAM_CHAT_ID")?,
            telegram_api_base: or("TELEGRAM_API_BASE", "https://api.telegram.org"),
            token_file: or("TOKEN_FILE", "hh_tokens.json").into(),
            ledger_file: or("LEDGER_FILE", "processed_applications.txt").into(),
            log_file: or("LOG_FILE", "hh_bitrix.log").into(),
            sync_interval: Duration::from_secs(number("SYNC_INTERVAL_SECS", 600)?.max(1)),
            min_request_interval: Duration::from_millis(number("MIN_REQUEST_INTERVAL_MS", 1000)?),
            event_delay: Duration::from_millis(number("EVENT_DELAY_MS", 2000)?),
        })
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.hh_client_id.clone(),
            client_secret: self.hh_client_secret.clone(),
            redirect_uri: self.hh_redirect_uri.clone(),
            oauth_base: self.hh_oauth_base.clone(),
        }
    }

    pub fn telegram_options(&self) -> TelegramOptions {
        TelegramOptions {
            api_base: self.telegram_api_base.clone(),
            bot_token: self.telegram_bot_token.clone(),
            chat_id: self.telegram_chat_id.clone(),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            min_interval: self.min_request_interval,
            ..TransportConfig::default()
        }
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy::default()
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            event_delay: self.event_delay,
            ..SyncConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sync_every: self.sync_interval,
            ..SchedulerConfig::default()
        }
    }

    pub fn sync_interval_minutes(&self) -> u64 {
        (self.sync_interval.as_secs() / 60).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("HH_CLIENT_ID", "client"),
            ("HH_CLIENT_SECRET", "secret"),
            ("BITRIX_WEBHOOK_URL", "https://corp.bitrix24.ru/rest/1/key/crm.lead.add.json"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100500"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&required_vars()).unwrap();

        assert_eq!(config.hh_api_base, "https://api.hh.ru");
        assert_eq!(config.hh_redirect_uri, "http://localhost:8000/callback");
        assert_eq!(config.token_file, PathBuf::from("hh_tokens.json"));
        assert_eq!(config.ledger_file, PathBuf::from("processed_applications.txt"));
        assert_eq!(config.sync_interval, Duration::from_secs(600));
        assert_eq!(config.sync_interval_minutes(), 10);
        assert_eq!(config.transport_config().min_interval, Duration::from_secs(1));
        assert_eq!(config.sync_config().event_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_required_names_variable() {
        let mut vars = required_vars();
        vars.insert("TELEGRAM_CHAT_ID", "  ");

        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_CHAT_ID"));
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let mut vars = required_vars();
        vars.insert("SYNC_INTERVAL_SECS", "120");
        vars.insert("MIN_REQUEST_INTERVAL_MS", "250");
        let config = load(&vars).unwrap();
        assert_eq!(config.scheduler_config().sync_every, Duration::from_secs(120));
        assert_eq!(config.min_request_interval, Duration::from_millis(250));

        vars.insert("EVENT_DELAY_MS", "soon");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("EVENT_DELAY_MS"));
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = load(&required_vars()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("123:abc"));
        assert!(!debug.contains("crm.lead.add"));
    }
}
