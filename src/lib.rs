//! event-journal
//!
//! Journal append-only de eventos de dominio con versión por ref y
//! concurrencia optimista, sobre backends intercambiables (memoria,
//! PostgreSQL, MongoDB).
//!
//! Este crate re-exporta la superficie pública para consumidores de la
//! librería; la implementación vive en `crates/*`.

pub use journal_core::{config, validation, AdapterKind, AppendRequest, ConnectionOptions, Event, JournalConfig,
                       JournalError, ListRequest, NewEvent, StorageAdapter, ValidationError, Version, VersionRange};
pub use journal_infra::{AdapterRegistry, Journal};
pub use journal_persistence::{DocumentAdapter, PersistenceError, RelationalAdapter};
