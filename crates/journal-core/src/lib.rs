//! journal-core: contrato del journal de eventos.
//!
//! - `model`: `Event`, `NewEvent`, `VersionRange`.
//! - `adapter`: trait `StorageAdapter`, `AdapterKind` y el adapter en memoria.
//! - `validation`: reglas de argumentos (tipados y peticiones JSON laxas).
//! - `options` / `config`: opciones de conexión y configuración desde `.env`.
pub mod adapter;
pub mod config;
pub mod error;
pub mod model;
pub mod options;
pub mod validation;

#[cfg(any(test, feature = "conformance"))]
pub mod conformance;

pub use adapter::{AdapterKind, InMemoryAdapter, StorageAdapter};
pub use config::JournalConfig;
pub use error::{BoxError, JournalError, ValidationError};
pub use model::{Event, NewEvent, Version, VersionRange};
pub use options::ConnectionOptions;
pub use validation::{AppendRequest, ListRequest};
