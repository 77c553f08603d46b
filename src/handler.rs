//! Webhook pipeline: validate the event, parse the update, gate on the chat id,
//! then either alert the operator or forward the text.
//!
//! `handle` never fails. Errors are logged and folded into a generic response
//! body; error details never appear in the response.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ParseError, RelayError, ValidationError};
use crate::telegram::{text_len, ChatId, Message, Notifier, Update};

/// Largest accepted request body, in characters.
pub const MAX_BODY_LEN: usize = 10_000;

/// Serverless-style response: a status code and a JSON-encoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    fn message(text: &str) -> Self {
        Self {
            status_code: 200,
            body: json!({ "message": text }).to_string(),
        }
    }

    fn error(status_code: u16) -> Self {
        let text = match status_code {
            400 => "Invalid request",
            413 => "Request too large",
            _ => "Internal server error",
        };
        Self {
            status_code,
            body: json!({ "error": text }).to_string(),
        }
    }
}

/// Successful terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoAction,
    Unauthorized,
    EmptyIgnored,
    Sent,
}

impl Outcome {
    pub fn message(self) -> &'static str {
        match self {
            Outcome::NoAction => "No action taken",
            Outcome::Unauthorized => "Unauthorized",
            Outcome::EmptyIgnored => "Empty message ignored",
            Outcome::Sent => "Message sent successfully",
        }
    }
}

/// Handle one webhook invocation. `event` is expected to look like `{"body": "<update json>"}`.
pub async fn handle(event: &Value, config: &Config, notifier: &dyn Notifier) -> HandlerResponse {
    let span = info_span!("invocation", request_id = %Uuid::new_v4());

    async move {
        match process(event, config, notifier).await {
            Ok(outcome) => HandlerResponse::message(outcome.message()),
            Err(e) => {
                match &e {
                    RelayError::Validation(ValidationError::MalformedRequest) => {
                        error!("Invalid event structure")
                    }
                    RelayError::Validation(ValidationError::RequestTooLarge { .. }) => {
                        error!("Request body too large")
                    }
                    _ => error!("Handler error: {}", e),
                }
                HandlerResponse::error(e.status_code())
            }
        }
    }
    .instrument(span)
    .await
}

async fn process(
    event: &Value,
    config: &Config,
    notifier: &dyn Notifier,
) -> Result<Outcome, RelayError> {
    let body = validate_event(event)?;

    let value: Value = serde_json::from_str(body).map_err(ParseError::Json)?;
    if !has_text(&value) {
        warn!("No valid text message found in request");
        return Ok(Outcome::NoAction);
    }

    let update: Update = serde_json::from_value(value).map_err(ParseError::Update)?;
    let Some((message, text)) = update
        .message
        .and_then(|m| m.text.clone().map(|text| (m, text)))
    else {
        warn!("No valid text message found in request");
        return Ok(Outcome::NoAction);
    };

    let allowed = config.allowed_chat_id();
    if !is_authorized(allowed, &message.chat.id) {
        warn!(
            "Unauthorized message from chat ID: {}, expected: {}",
            message.chat.id,
            allowed.unwrap_or("<unset>")
        );
        let alert = format_alert(&message, &text, Utc::now());
        if let Err(e) = notifier.send_message(&alert).await {
            error!("Failed to send security alert: {}", e);
        }
        return Ok(Outcome::Unauthorized);
    }

    let text = text.trim();
    if text.is_empty() {
        warn!("Empty message received");
        return Ok(Outcome::EmptyIgnored);
    }

    notifier.send_message(text).await?;
    info!("Forwarded message from chat {}", message.chat.id);
    Ok(Outcome::Sent)
}

/// Pull the raw body out of the event, enforcing shape and size.
fn validate_event(event: &Value) -> Result<&str, ValidationError> {
    let body = event
        .get("body")
        .and_then(Value::as_str)
        .filter(|body| !body.is_empty())
        .ok_or(ValidationError::MalformedRequest)?;

    let len = text_len(body);
    if len > MAX_BODY_LEN {
        return Err(ValidationError::RequestTooLarge {
            len,
            max: MAX_BODY_LEN,
        });
    }
    Ok(body)
}

fn has_text(value: &Value) -> bool {
    value
        .pointer("/message/text")
        .and_then(Value::as_str)
        .is_some_and(|text| !text.is_empty())
}

/// A chat is authorized only when an allowed id is configured and matches exactly.
pub fn is_authorized(allowed: Option<&str>, chat_id: &ChatId) -> bool {
    match allowed {
        Some(allowed) => chat_id.to_string() == allowed,
        None => false,
    }
}

/// Operator alert for a message from an unauthorized chat. The offending text is
/// quoted as-is.
pub fn format_alert(message: &Message, text: &str, now: DateTime<Utc>) -> String {
    let from = message.from.as_ref();
    let first_name = non_empty(from.and_then(|u| u.first_name.as_ref())).unwrap_or("Unknown");
    let last_name = non_empty(from.and_then(|u| u.last_name.as_ref())).unwrap_or("");
    let username = non_empty(from.and_then(|u| u.username.as_ref())).unwrap_or("no-username");

    format!(
        "🚨 Security Alert: Unauthorized bot access attempt\n\
         \n\
         Chat ID: {}\n\
         User: {} {} (@{})\n\
         Message: \"{}\"\n\
         Time: {}",
        message.chat.id,
        first_name,
        last_name,
        username,
        text,
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}
