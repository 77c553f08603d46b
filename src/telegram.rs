use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, error, info};

use crate::config::TelegramConfig;
use crate::error::{ConfigError, DeliveryError, RelayError, ValidationError};

/// Telegram's limit for a single message
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Text length as Telegram counts it (UTF-16 code units).
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}

// ── Inbound update model ───────────────────────────────────────────────────────
//
// Only `message.chat.id` and `message.text` drive the pipeline. Every other field
// is read leniently: null, missing or wrongly typed values become `None`.

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Update {
    #[serde(default, deserialize_with = "lenient")]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient")]
    pub message_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default, deserialize_with = "lenient")]
    pub date: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(dead_code)]
pub struct User {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub is_bot: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Chat {
    pub id: ChatId,
    #[serde(default, deserialize_with = "lenient")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub username: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
}

/// Deserialize `T` if the value fits, otherwise fall back to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Numeric on the wire, but compared as a string against the configured id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Number(Number),
    Str(String),
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId::Number(id.into())
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatId::Number(n) => match n.as_f64() {
                // Integral floats (`1.0`) print without the fraction.
                Some(v) if n.is_f64() && v.fract() == 0.0 && v.abs() < 9.0e15 => {
                    write!(f, "{}", v as i64)
                }
                _ => write!(f, "{}", n),
            },
            ChatId::Str(id) => write!(f, "{}", id),
        }
    }
}

// ── Outbound notifier ──────────────────────────────────────────────────────────

/// Delivers text to the operator chat. Implementations do not check who the
/// message came from; authorization is the caller's job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), RelayError>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base_url: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, text: &str) -> Result<(), RelayError> {
        // Best-effort callers (alerts) rely on empty text being a no-op.
        if text.is_empty() {
            return Ok(());
        }

        let len = text_len(text);
        if len > MAX_MESSAGE_LEN {
            return Err(ValidationError::MessageTooLong {
                len,
                max: MAX_MESSAGE_LEN,
            }
            .into());
        }

        let token = self.bot_token.as_deref().ok_or(ConfigError::TokenNotSet)?;
        let chat_id = self.chat_id.as_deref().ok_or(ConfigError::ChatIdNotSet)?;

        // Token goes in the path only; the JSON body carries everything else.
        let url = format!("{}/bot{}/sendMessage", self.api_base_url, token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
        };

        debug!("Sending {} chars to Telegram chat {}", len, chat_id);

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                let e = e.without_url();
                error!("Error sending message to Telegram: {}", e);
                return Err(DeliveryError::Network(e).into());
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            let description = response
                .json::<ApiErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.description)
                .unwrap_or_else(|| "Unknown error".to_string());
            error!(
                status = status.as_u16(),
                error = %description,
                "Failed to send Telegram message"
            );
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                description,
            }
            .into());
        }

        info!("Message delivered to Telegram chat {}", chat_id);
        Ok(())
    }
}
