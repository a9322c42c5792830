//! Tipos del journal: `Event` persistido, `NewEvent` validado y rangos de
//! versión.
//!
//! Rol en el flujo:
//! - El `Journal` valida argumentos y construye un `NewEvent`.
//! - El adapter resuelve la versión, persiste y devuelve el `Event` completo
//!   (con `version` y `created_on`).
//! - Un `Event` es inmutable una vez persistido.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Versión de un evento dentro de su ref (1-based). `0` significa "sin
/// eventos".
pub type Version = u64;

/// Evento persistido. La forma serializada sigue el registro lógico
/// `{ref, version, event, payload, initiated_by, created_on}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "ref")]
    pub reference: String,
    pub version: Version,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<String>,
    pub created_on: DateTime<Utc>, // asignado por el adapter al persistir
}

/// Evento pendiente de persistir, ya validado por el `Journal`.
///
/// `expected_version` es la última versión que el llamador observó; si es
/// `None` el adapter la resuelve leyendo la última versión del ref.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub name: String,
    pub reference: String,
    pub payload: Option<Value>,
    pub initiated_by: Option<String>,
    pub expected_version: Option<Version>,
}

impl NewEvent {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self { name: name.into(),
               reference: reference.into(),
               payload: None,
               initiated_by: None,
               expected_version: None }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn initiated_by(mut self, actor: impl Into<String>) -> Self {
        self.initiated_by = Some(actor.into());
        self
    }

    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Materializa el evento con la versión ganada y el timestamp de
    /// persistencia.
    pub fn into_event(self, version: Version, created_on: DateTime<Utc>) -> Event {
        Event { reference: self.reference,
                version,
                event: self.name,
                payload: self.payload,
                initiated_by: self.initiated_by,
                created_on }
    }
}

/// Rango inclusivo de versiones; un extremo `None` no acota ese lado.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionRange {
    pub from: Option<Version>,
    pub to: Option<Version>,
}

impl VersionRange {
    pub fn new(from: Option<Version>, to: Option<Version>) -> Self {
        Self { from, to }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, version: Version) -> bool {
        self.from.map_or(true, |f| version >= f) && self.to.map_or(true, |t| version <= t)
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(f), Some(t)) if f > t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_with_logical_field_names() {
        let ev = NewEvent::new("Created", "ref1").with_payload(json!({"a": 1}))
                                                 .initiated_by("alice")
                                                 .into_event(1, Utc::now());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["ref"], "ref1");
        assert_eq!(v["event"], "Created");
        assert_eq!(v["version"], 1);
        assert_eq!(v["initiated_by"], "alice");
        assert!(v.get("created_on").is_some());
    }

    #[test]
    fn range_bounds_are_inclusive_and_open_ended() {
        let r = VersionRange::new(Some(2), Some(4));
        assert!(!r.contains(1));
        assert!(r.contains(2) && r.contains(4));
        assert!(!r.contains(5));
        assert!(VersionRange::all().contains(u64::MAX));
        assert!(VersionRange::new(None, Some(3)).contains(1));
        assert!(VersionRange::new(Some(5), Some(4)).is_inverted());
        assert!(!VersionRange::new(Some(4), Some(4)).is_inverted());
    }
}
