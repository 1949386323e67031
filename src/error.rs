use thiserror::Error;

use crate::types::SecurityId;

/// Per-event failures. None of these are fatal to a session; the caller logs
/// them and moves on to the next event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("event received before registration")]
    NotRegistered,
    #[error("registration received twice")]
    AlreadyRegistered,
    #[error("unknown or non-tradeable security: {0}")]
    UnknownSecurity(SecurityId),
    #[error("malformed news: {0}")]
    MalformedNews(#[from] NewsDecodeError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NewsDecodeError {
    #[error("headline is missing the security token")]
    MissingSecurity,
    #[error("headline is missing the target time")]
    MissingTargetTime,
    #[error("target time is not a number: {0:?}")]
    TargetTime(String),
    #[error("predicted price is not a number: {0:?}")]
    Price(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("min_clip ({min}) exceeds max_clip ({max})")]
    ClipRange { min: i64, max: i64 },
}
