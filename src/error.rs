//! Error kinds raised while relaying a webhook update.
//!
//! Every failure in the pipeline is one of four kinds. `RelayError::status_code`
//! maps each to the status reported to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    RemoteDelivery(#[from] DeliveryError),
}

/// Malformed or oversized input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid event structure")]
    MalformedRequest,

    #[error("request body too large ({len} characters, max {max})")]
    RequestTooLarge { len: usize, max: usize },

    #[error("message too long ({len} characters, max {max})")]
    MessageTooLong { len: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON in request body: {0}")]
    Json(#[source] serde_json::Error),

    #[error("request body is not a readable update: {0}")]
    Update(#[source] serde_json::Error),
}

/// Missing secrets. A deployment fault rather than a request fault.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    TokenNotSet,

    #[error("TELEGRAM_CHAT_ID is not set")]
    ChatIdNotSet,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The Bot API answered with a non-200 status.
    #[error("failed to send message (HTTP {status}: {description})")]
    Rejected { status: u16, description: String },

    #[error("error sending message to Telegram: {0}")]
    Network(#[source] reqwest::Error),
}

impl RelayError {
    /// HTTP status reported to the caller for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::Validation(ValidationError::MalformedRequest) => 400,
            RelayError::Validation(ValidationError::RequestTooLarge { .. }) => 413,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_status_codes() {
        assert_eq!(
            RelayError::from(ValidationError::MalformedRequest).status_code(),
            400
        );
        assert_eq!(
            RelayError::from(ValidationError::RequestTooLarge { len: 10_001, max: 10_000 })
                .status_code(),
            413
        );
        assert_eq!(
            RelayError::from(ValidationError::MessageTooLong { len: 5000, max: 4096 })
                .status_code(),
            500
        );
    }

    #[test]
    fn test_internal_kinds_map_to_500() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(RelayError::from(ParseError::Json(parse)).status_code(), 500);
        assert_eq!(RelayError::from(ConfigError::TokenNotSet).status_code(), 500);
        let rejected = DeliveryError::Rejected {
            status: 400,
            description: "Bad Request".to_string(),
        };
        assert_eq!(RelayError::from(rejected).status_code(), 500);
    }

    #[test]
    fn test_rejected_message_carries_status_and_description() {
        let err = RelayError::from(DeliveryError::Rejected {
            status: 401,
            description: "Unauthorized".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "failed to send message (HTTP 401: Unauthorized)"
        );
    }
}
