use thiserror::Error;

use crate::types::error_types::Error as ApiError;

/// A unified error type for this library.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// HTTP request failed (network or protocol issue).
    #[error("Reqwest Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// HTTP returned a non-2xx status with a JSON error body.
    #[error("API Error ({status}): {error:?}")]
    ApiError { status: u16, error: ApiError },

    /// The server returned an error status we couldn't parse as `ApiError`.
    /// Contains the HTTP status code and raw body.
    #[error("Non-success HTTP status {code}, body: {body}")]
    HttpStatus {
        code: u16,
        body: String,
    },

    /// Serde (de)serialization error.
    #[error("Serde JSON error: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// Gateway connection or protocol failure.
    #[error("Gateway error: {0}")]
    Gateway(String),

    // Other
    #[error("Other error: {0}")]
    Other(String),
}

impl DiscordError {
    /// HTTP status of the failed request, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::HttpStatus { code, .. } => Some(*code),
            Self::ReqwestError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The referenced resource does not exist (any more).
    pub fn is_not_found(&self) -> bool {
        if let Self::ApiError { error, .. } = self {
            if error.kind().is_unknown_resource() {
                return true;
            }
        }
        self.status() == Some(404)
    }

    /// Worth retrying later: transport failures, rate limits and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ReqwestError(e) => !(e.is_decode() || e.is_builder()),
            Self::Gateway(_) => true,
            _ => matches!(self.status(), Some(429) | Some(500..=599)),
        }
    }
}

/// Wrap a parsed error body together with its HTTP status.
pub fn handle_api_error(status: u16, err: ApiError) -> DiscordError {
    DiscordError::ApiError { status, error: err }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, code: u32) -> DiscordError {
        handle_api_error(
            status,
            ApiError {
                code,
                message: "boom".into(),
                errors: None,
            },
        )
    }

    #[test]
    fn unknown_channel_is_not_found() {
        assert!(api_error(404, 10003).is_not_found());
        assert!(api_error(400, 10008).is_not_found());
        assert!(!api_error(403, 50013).is_not_found());
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let limited = DiscordError::HttpStatus {
            code: 429,
            body: String::new(),
        };
        assert!(limited.is_transient());
        assert!(api_error(502, 0).is_transient());
        assert!(!api_error(403, 50013).is_transient());
    }
}
