//! Selector de adapters: mapa cerrado `AdapterKind` -> constructor.
//!
//! Cada llamada a `create` devuelve una instancia nueva y sin conectar; el
//! `Journal` es su único dueño.

use std::collections::HashMap;

use journal_core::{AdapterKind, InMemoryAdapter, JournalError, StorageAdapter};
use journal_persistence::{DocumentAdapter, RelationalAdapter};

pub type AdapterConstructor = fn() -> Box<dyn StorageAdapter>;

fn memory() -> Box<dyn StorageAdapter> {
    Box::new(InMemoryAdapter::new())
}

fn relational() -> Box<dyn StorageAdapter> {
    Box::new(RelationalAdapter::new())
}

fn document() -> Box<dyn StorageAdapter> {
    Box::new(DocumentAdapter::new())
}

#[derive(Clone)]
pub struct AdapterRegistry {
    constructors: HashMap<AdapterKind, AdapterConstructor>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut constructors: HashMap<AdapterKind, AdapterConstructor> = HashMap::new();
        constructors.insert(AdapterKind::Memory, memory);
        constructors.insert(AdapterKind::Relational, relational);
        constructors.insert(AdapterKind::Document, document);
        Self { constructors }
    }
}

impl AdapterRegistry {
    /// Reemplaza el constructor de un backend (dobles de test, variantes
    /// instrumentadas).
    pub fn with_constructor(mut self, kind: AdapterKind, constructor: AdapterConstructor) -> Self {
        self.constructors.insert(kind, constructor);
        self
    }

    /// Resuelve un nombre insensible a mayúsculas.
    pub fn resolve(&self, name: &str) -> Result<AdapterKind, JournalError> {
        let kind: AdapterKind = name.parse()?;
        if self.constructors.contains_key(&kind) {
            Ok(kind)
        } else {
            Err(JournalError::InvalidAdapter(name.to_string()))
        }
    }

    pub fn create(&self, kind: AdapterKind) -> Result<Box<dyn StorageAdapter>, JournalError> {
        self.constructors
            .get(&kind)
            .map(|ctor| ctor())
            .ok_or_else(|| JournalError::InvalidAdapter(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_adapters_are_registered() {
        let registry = AdapterRegistry::default();
        for kind in AdapterKind::ALL {
            assert_eq!(registry.create(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        let registry = AdapterRegistry::default();
        assert_eq!(registry.resolve("Memory").unwrap(), AdapterKind::Memory);
        assert!(matches!(registry.resolve("redis"), Err(JournalError::InvalidAdapter(n)) if n == "redis"));
    }
}
