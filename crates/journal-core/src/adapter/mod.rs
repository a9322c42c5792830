//! Contrato de almacenamiento del journal y selector de backend.
//!
//! Protocolo de append (todas las variantes):
//! 1. Sin `expected_version`, se resuelve leyendo la última versión del ref
//!    (0 si no hay eventos).
//! 2. Se persiste `expected_version + 1`; la unicidad `(ref, version)` la
//!    garantiza el backend (índice único) y es el verdadero punto de
//!    serialización.
//! 3. Si la unicidad se viola, se relee la última versión y se devuelve
//!    `JournalError::Conflict`. No hay reintento automático.
//! 4. Cualquier otro fallo se envuelve como `JournalError::Adapter`.

mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JournalError;
use crate::model::{Event, NewEvent, Version, VersionRange};
use crate::options::ConnectionOptions;

pub use memory::InMemoryAdapter;

/// Conjunto cerrado de backends soportados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Memory,
    Relational,
    Document,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 3] = [AdapterKind::Memory, AdapterKind::Relational, AdapterKind::Document];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Memory => "memory",
            AdapterKind::Relational => "relational",
            AdapterKind::Document => "document",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = JournalError;

    /// Nombre insensible a mayúsculas; acepta alias habituales del backend.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(AdapterKind::Memory),
            "relational" | "postgres" | "postgresql" | "pg" | "sql" => Ok(AdapterKind::Relational),
            "document" | "mongo" | "mongodb" => Ok(AdapterKind::Document),
            _ => Err(JournalError::InvalidAdapter(s.to_string())),
        }
    }
}

/// Backend de almacenamiento del journal.
///
/// Ciclo de vida: `unconnected -> connected -> unconnected`. Tras
/// `disconnect` la instancia no se reutiliza. La protección contra doble
/// conexión es responsabilidad del `Journal`, no del adapter.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    /// Establece la conexión fusionando los defaults del backend bajo
    /// `options` (gana el llamador).
    async fn connect(&mut self, options: &ConnectionOptions) -> Result<(), JournalError>;

    /// Libera el handle del backend.
    async fn disconnect(&mut self) -> Result<(), JournalError>;

    /// Agrega un evento asignando `expected_version + 1` de forma atómica
    /// respecto a otros appends sobre el mismo ref.
    async fn append_event(&self, new_event: NewEvent) -> Result<Event, JournalError>;

    /// Eventos del ref dentro de `range`, en orden ascendente de versión.
    async fn list_events(&self, reference: &str, range: VersionRange) -> Result<Vec<Event>, JournalError>;

    /// Mayor versión almacenada para el ref, o 0.
    async fn latest_version(&self, reference: &str) -> Result<Version, JournalError>;
}

/// Construye el `Conflict` tras una violación de unicidad, releyendo la
/// última versión con la misma semántica que el camino de append.
pub async fn conflict_after_duplicate<A>(adapter: &A, reference: &str, expected_version: Version) -> JournalError
    where A: StorageAdapter + ?Sized
{
    match adapter.latest_version(reference).await {
        Ok(actual_version) => {
            log::warn!("append:conflict ref={reference} expected={expected_version} latest={actual_version}");
            JournalError::Conflict { reference: reference.to_string(), expected_version, actual_version }
        }
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_names_are_case_insensitive() {
        assert_eq!("MEMORY".parse::<AdapterKind>().unwrap(), AdapterKind::Memory);
        assert_eq!("Relational".parse::<AdapterKind>().unwrap(), AdapterKind::Relational);
        assert_eq!(" document ".parse::<AdapterKind>().unwrap(), AdapterKind::Document);
        assert_eq!("MongoDB".parse::<AdapterKind>().unwrap(), AdapterKind::Document);
        assert_eq!("postgres".parse::<AdapterKind>().unwrap(), AdapterKind::Relational);
    }

    #[test]
    fn unknown_adapter_is_rejected() {
        let err = "cassandra".parse::<AdapterKind>().unwrap_err();
        assert!(matches!(err, JournalError::InvalidAdapter(ref n) if n == "cassandra"));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for kind in AdapterKind::ALL {
            assert_eq!(kind.to_string().parse::<AdapterKind>().unwrap(), kind);
        }
    }
}
