use discord_api::DiscordError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while reconciling tickets or handling events.
///
/// None of these stop a loop; the variant decides whether the item is
/// retried next round or treated as already done.
#[derive(Debug, Error)]
pub enum BotError {
    /// Network or API hiccup. Retried on the next tick.
    #[error("transient external failure: {0}")]
    TransientExternal(String),

    /// The ticket, channel or message is gone.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store failure. Aborts the current item's step.
    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),

    /// Invalid configuration. Only raised at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BotError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StoreError> for BotError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Persistence(other),
        }
    }
}

impl From<DiscordError> for BotError {
    fn from(err: DiscordError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::TransientExternal(err.to_string())
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_404_maps_to_not_found() {
        let err: BotError = DiscordError::HttpStatus {
            code: 404,
            body: String::new(),
        }
        .into();
        assert!(err.is_not_found());

        let err: BotError = DiscordError::HttpStatus {
            code: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, BotError::TransientExternal(_)));
    }

    #[test]
    fn store_errors_are_persistence() {
        let err: BotError = StoreError::storage("set status", "disk full").into();
        assert!(matches!(err, BotError::Persistence(_)));

        let err: BotError = StoreError::NotFound("ticket 4".into()).into();
        assert!(err.is_not_found());
    }
}
