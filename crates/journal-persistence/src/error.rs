//! Errores de persistencia.
//! Mapea errores de Diesel / r2d2 / MongoDB a variantes semánticas; sólo
//! `UniqueViolation` se traduce a conflicto, el resto viaja como
//! `JournalError::Adapter`.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use journal_core::JournalError;
use mongodb::error::{Error as MongoError, ErrorKind as MongoErrorKind, WriteFailure};
use thiserror::Error;

/// Código de servidor MongoDB para clave duplicada.
pub const MONGO_DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("serialization conflict: {0}")]
    SerializationConflict(String),
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("not connected")]
    NotConnected,
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    pub fn into_journal(self, backend: &str) -> JournalError {
        match self {
            Self::NotConnected => JournalError::not_connected(backend),
            other => {
                log::error!("{backend} backend failure: {other}");
                JournalError::adapter(backend, other)
            }
        }
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict(info.message().to_string()),
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::InvalidData(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::InvalidData(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<r2d2::Error> for PersistenceError {
    fn from(err: r2d2::Error) -> Self {
        Self::TransientIo(format!("pool error: {err}"))
    }
}

/// `true` si el error de MongoDB es una violación del índice único.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        MongoErrorKind::Write(WriteFailure::WriteError(we)) => we.code == MONGO_DUPLICATE_KEY,
        MongoErrorKind::Command(ce) => ce.code == MONGO_DUPLICATE_KEY,
        _ => false,
    }
}

impl From<MongoError> for PersistenceError {
    fn from(err: MongoError) -> Self {
        if is_duplicate_key(&err) {
            return Self::UniqueViolation(err.to_string());
        }
        match err.kind.as_ref() {
            MongoErrorKind::Io(_) | MongoErrorKind::ServerSelection { .. } | MongoErrorKind::ConnectionPoolCleared { .. } => {
                Self::TransientIo(err.to_string())
            }
            MongoErrorKind::BsonSerialization(_) | MongoErrorKind::BsonDeserialization(_) => {
                Self::InvalidData(err.to_string())
            }
            _ => Self::Unknown(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_maps_to_adapter_error() {
        let err = PersistenceError::NotConnected.into_journal("relational");
        assert_eq!(err.to_string(), "relational adapter error: adapter not connected");
    }

    #[test]
    fn diesel_not_found_is_unknown() {
        let err = PersistenceError::from(DieselError::NotFound);
        assert!(matches!(err, PersistenceError::Unknown(_)));
    }

    #[test]
    fn unique_violation_is_never_a_generic_adapter_failure_upstream() {
        let err = PersistenceError::UniqueViolation("dup".into());
        assert_eq!(err.to_string(), "unique violation: dup");
    }
}
