//! Taxonomía de errores del journal.
//!
//! - Errores de validación: entrada del llamador, nunca llegan al adapter.
//! - `Conflict`: pérdida de concurrencia optimista; el llamador decide si
//!   reintenta (el core nunca reintenta).
//! - `Adapter` / `Initialization`: fallos de backend envolviendo la causa.

use thiserror::Error;

use crate::model::Version;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("event name is required")] MissingEventName,
    #[error("event name must be a string")] InvalidEventName,
    #[error("ref is required")] MissingRef,
    #[error("version must be a number")] InvalidVersionType,
    #[error("version must not be negative")] NegativeVersion,
    #[error("version must be an integer")] NonIntegerVersion,
    #[error("payload must not be a function")] PayloadIsFunction,
    #[error("payload must be a plain object, array or scalar")] PayloadIsCustomObject,
    #[error("from_version {from} exceeds to_version {to}")] RangeInverted { from: Version, to: Version },
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("invalid adapter: {0}")]
    InvalidAdapter(String),
    #[error("journal client already initialized")]
    AlreadyInitialized,
    #[error("journal client not initialized")]
    NotInitialized,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid ref {reference:?}: {reason}")]
    InvalidRef { reference: String, reason: String },
    #[error("version conflict on ref {reference}: expected {expected_version}, latest is {actual_version}")]
    Conflict { reference: String, expected_version: Version, actual_version: Version },
    #[error("failed to initialize {adapter} adapter: {source}")]
    Initialization { adapter: String, #[source] source: BoxError },
    #[error("{backend} adapter error: {source}")]
    Adapter { backend: String, #[source] source: BoxError },
}

impl JournalError {
    /// Envuelve cualquier error de backend como `Adapter`.
    pub fn adapter(backend: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Adapter { backend: backend.into(), source: source.into() }
    }

    pub fn not_connected(backend: impl Into<String>) -> Self {
        Self::adapter(backend, "adapter not connected")
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Sólo los conflictos son recuperables releyendo y reintentando.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_carries_versions() {
        let err = JournalError::Conflict { reference: "r1".into(), expected_version: 1, actual_version: 2 };
        assert_eq!(err.to_string(), "version conflict on ref r1: expected 1, latest is 2");
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_converts_transparently() {
        let err: JournalError = ValidationError::RangeInverted { from: 5, to: 2 }.into();
        assert_eq!(err.to_string(), "from_version 5 exceeds to_version 2");
        assert_eq!(err.validation(), Some(&ValidationError::RangeInverted { from: 5, to: 2 }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn adapter_error_keeps_source() {
        let io = std::io::Error::other("socket closed");
        let err = JournalError::adapter("relational", io);
        assert_eq!(err.to_string(), "relational adapter error: socket closed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
