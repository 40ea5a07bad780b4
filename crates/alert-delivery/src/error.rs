//! Error types and retry classification for the delivery engine.
//!
//! Retry eligibility is a structural decision on typed errors, not message
//! matching: every adapter failure maps into a `DeliveryError` variant, and
//! `DeliveryError::class` places it into one of three classes that drive
//! the retry engine and the dispatcher's terminal-status choice.

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Failure modes of a delivery attempt or engine operation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("circuit open for channel {0}")]
    CircuitOpen(Uuid),

    #[error("invalid channel config: {0}")]
    InvalidConfig(String),

    #[error("channel {0} is disabled")]
    ChannelDisabled(Uuid),

    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("invalid stats window: {0:?}")]
    InvalidWindow(String),

    #[error("rule evaluation failed: {0}")]
    Evaluation(String),

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Retry eligibility of a `DeliveryError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying while attempt budget remains: network trouble,
    /// timeouts, server-side HTTP errors.
    Transient,
    /// Retrying cannot help: auth/permission rejections, bad config,
    /// malformed payloads.
    Fatal,
    /// The call was never attempted; eligible again once the breaker's
    /// reset window elapses, i.e. on a later dispatch cycle.
    CircuitOpen,
}

impl DeliveryError {
    /// Classify this error for retry eligibility.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection(_) | Self::Timeout => ErrorClass::Transient,
            Self::Http { status } => match *status {
                408 | 429 => ErrorClass::Transient,
                500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Fatal,
            },
            Self::CircuitOpen(_) => ErrorClass::CircuitOpen,
            // Storage hiccups are transient by nature, though they are
            // normally logged and skipped rather than retried inline.
            Self::Store(_) => ErrorClass::Transient,
            Self::InvalidConfig(_)
            | Self::ChannelDisabled(_)
            | Self::AlertNotFound(_)
            | Self::InvalidWindow(_)
            | Self::Evaluation(_)
            | Self::Serialize(_) => ErrorClass::Fatal,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
