use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::path::Path;

pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Sole authorized chat, and the only chat messages are ever sent to.
    #[serde(default, deserialize_with = "deserialize_chat_id")]
    pub chat_id: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

// Keep the bot token out of logs.
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Chat ids are numeric on Telegram, so accept both `chat_id = 123` and `chat_id = "123"`.
fn deserialize_chat_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawChatId {
        Int(i64),
        Str(String),
    }

    Ok(match Option::<RawChatId>::deserialize(deserializer)? {
        Some(RawChatId::Int(id)) => Some(id.to_string()),
        Some(RawChatId::Str(id)) => non_empty(id),
        None => None,
    })
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.telegram.bot_token = config.telegram.bot_token.and_then(non_empty);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Overlay `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` on top of the file values.
    /// Empty variables are treated as unset.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN).and_then(non_empty) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = lookup(ENV_CHAT_ID).and_then(non_empty) {
            self.telegram.chat_id = Some(chat_id);
        }
        self
    }

    pub fn allowed_chat_id(&self) -> Option<&str> {
        self.telegram.chat_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.telegram.bot_token.is_none());
        assert!(config.telegram.chat_id.is_none());
        assert_eq!(config.telegram.api_base_url, "https://api.telegram.org");
        assert_eq!(config.server.bind_address.port(), 8080);
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml_str(
            r#"
[telegram]
bot_token = "123:abc"
chat_id = 424242
api_base_url = "http://localhost:9000"

[server]
bind_address = "127.0.0.1:3000"
"#,
        )
        .unwrap();
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.allowed_chat_id(), Some("424242"));
        assert_eq!(config.telegram.api_base_url, "http://localhost:9000");
        assert_eq!(config.server.bind_address.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_string_chat_id_and_blank_token() {
        let config = Config::from_toml_str(
            r#"
[telegram]
bot_token = "  "
chat_id = "-100123"
"#,
        )
        .unwrap();
        assert!(config.telegram.bot_token.is_none());
        assert_eq!(config.allowed_chat_id(), Some("-100123"));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::from_toml_str(
            r#"
[telegram]
bot_token = "file-token"
chat_id = 1
"#,
        )
        .unwrap()
        .with_env(env(&[(ENV_BOT_TOKEN, "env-token"), (ENV_CHAT_ID, "2")]));
        assert_eq!(config.telegram.bot_token.as_deref(), Some("env-token"));
        assert_eq!(config.allowed_chat_id(), Some("2"));
    }

    #[test]
    fn test_empty_env_is_ignored() {
        let config = Config::from_toml_str("[telegram]\nchat_id = 7\n")
            .unwrap()
            .with_env(env(&[(ENV_BOT_TOKEN, ""), (ENV_CHAT_ID, "")]));
        assert!(config.telegram.bot_token.is_none());
        assert_eq!(config.allowed_chat_id(), Some("7"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = Config::load(Path::new("/nonexistent/tg-relay/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config::default().with_env(env(&[(ENV_BOT_TOKEN, "secret-token")]));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
