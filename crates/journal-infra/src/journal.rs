//! `Journal`: fachada única del journal de eventos.
//!
//! Responsabilidades:
//! - Validar argumentos antes de cualquier I/O (gana el primer fallo).
//! - Exigir cliente conectado en append/list.
//! - Ser dueño exclusivo del adapter activo (a lo sumo uno por instancia).
//!
//! La asignación de versiones NO ocurre aquí: es atómica con la escritura
//! dentro del adapter.
//!
//! `create_client`/`destroy_client` toman `&mut self` y no son seguras en
//! concurrencia; append/list toman `&self`.

use journal_core::validation::{validate_append, validate_range};
use journal_core::{AdapterKind, AppendRequest, ConnectionOptions, Event, JournalConfig, JournalError, ListRequest,
                   NewEvent, StorageAdapter, Version, VersionRange};
use log::{debug, info, warn};
use serde_json::Value;

use crate::registry::AdapterRegistry;

pub struct Journal {
    config: JournalConfig,
    registry: AdapterRegistry,
    adapter: Option<Box<dyn StorageAdapter>>,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(JournalConfig::default())
    }
}

impl Journal {
    pub fn new(config: JournalConfig) -> Self {
        Self::with_registry(config, AdapterRegistry::default())
    }

    pub fn with_registry(config: JournalConfig, registry: AdapterRegistry) -> Self {
        Self { config, registry, adapter: None }
    }

    /// Configuración desde `.env` / variables de entorno.
    pub fn from_env() -> Self {
        Self::new(JournalConfig::from_env())
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn active_adapter(&self) -> Option<AdapterKind> {
        self.adapter.as_ref().map(|a| a.kind())
    }

    fn adapter(&self) -> Result<&dyn StorageAdapter, JournalError> {
        self.adapter.as_deref().ok_or(JournalError::NotInitialized)
    }

    /// Conecta un adapter nuevo.
    ///
    /// `adapter_name`/`options` toman precedencia sobre la configuración de
    /// construcción. Un fallo de `connect` se envuelve como
    /// `JournalError::Initialization`.
    pub async fn create_client(&mut self,
                               adapter_name: Option<&str>,
                               options: Option<ConnectionOptions>)
                               -> Result<&mut Self, JournalError> {
        let name = adapter_name.unwrap_or(&self.config.adapter_name);
        let kind = self.registry.resolve(name)?;
        if self.adapter.is_some() {
            return Err(JournalError::AlreadyInitialized);
        }
        let options = options.unwrap_or_else(|| self.config.db_connection_options.clone());
        let mut adapter = self.registry.create(kind)?;
        adapter.connect(&options)
               .await
               .map_err(|e| JournalError::Initialization { adapter: kind.to_string(), source: Box::new(e) })?;
        info!("journal client initialized adapter={kind}");
        self.adapter = Some(adapter);
        Ok(self)
    }

    /// Desconecta y descarta el adapter. Sin cliente activo es un no-op.
    ///
    /// El slot queda vacío aunque `disconnect` falle; el error se propaga y
    /// no se reintenta.
    pub async fn destroy_client(&mut self) -> Result<&mut Self, JournalError> {
        let Some(mut adapter) = self.adapter.take() else {
            return Ok(self);
        };
        let kind = adapter.kind();
        if let Err(e) = adapter.disconnect().await {
            warn!("journal client disconnect failed adapter={kind}: {e}");
            return Err(e);
        }
        info!("journal client destroyed adapter={kind}");
        Ok(self)
    }

    /// Agrega un evento al ref. `expected_version` es la última versión
    /// observada por el llamador; sin ella el adapter usa la última
    /// almacenada.
    pub async fn append_event(&self,
                              name: &str,
                              reference: &str,
                              payload: Option<Value>,
                              initiated_by: Option<&str>,
                              expected_version: Option<Version>)
                              -> Result<Event, JournalError> {
        let adapter = self.adapter()?;
        let new_event = NewEvent { name: name.to_string(),
                                   reference: reference.to_string(),
                                   payload,
                                   initiated_by: initiated_by.map(str::to_string),
                                   expected_version };
        validate_append(&new_event)?;
        debug!("journal append ref={reference} event={name} expected={expected_version:?}");
        adapter.append_event(new_event).await
    }

    /// Variante laxa de `append_event` para entradas JSON sin tipar.
    pub async fn append(&self, request: AppendRequest) -> Result<Event, JournalError> {
        let adapter = self.adapter()?;
        let new_event = request.validate()?;
        adapter.append_event(new_event).await
    }

    /// Eventos del ref con `from <= version <= to`, en orden ascendente.
    pub async fn list_events(&self,
                             reference: &str,
                             from_version: Option<Version>,
                             to_version: Option<Version>)
                             -> Result<Vec<Event>, JournalError> {
        let adapter = self.adapter()?;
        let range = validate_range(VersionRange::new(from_version, to_version))?;
        adapter.list_events(reference, range).await
    }

    /// Variante laxa de `list_events`.
    pub async fn list(&self, request: ListRequest) -> Result<Vec<Event>, JournalError> {
        let adapter = self.adapter()?;
        let (reference, range) = request.validate()?;
        adapter.list_events(&reference, range).await
    }

    pub async fn latest_version(&self, reference: &str) -> Result<Version, JournalError> {
        self.adapter()?.latest_version(reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use journal_core::ValidationError;
    use serde_json::json;

    async fn connected() -> Journal {
        let mut journal = Journal::default();
        journal.create_client(Some("memory"), None).await.unwrap();
        journal
    }

    #[tokio::test]
    async fn end_to_end_memory_scenario() {
        let journal = connected().await;
        journal.append_event("Created", "ref1", Some(json!({"a": 1})), None, None).await.unwrap();
        journal.append_event("Updated", "ref1", Some(json!({"a": 2})), None, None).await.unwrap();
        let events = journal.list_events("ref1", None, None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].version, events[0].event.as_str()), (1, "Created"));
        assert_eq!((events[1].version, events[1].event.as_str()), (2, "Updated"));
        assert_eq!(events[1].payload, Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn sequential_append_with_same_expected_version_conflicts() {
        let journal = connected().await;
        let first = journal.append_event("E", "ref1", Some(json!({})), None, Some(1)).await.unwrap();
        assert_eq!(first.version, 2);
        let err = journal.append_event("E", "ref1", Some(json!({})), None, Some(1)).await.unwrap_err();
        assert!(matches!(err, JournalError::Conflict { expected_version: 1, actual_version: 2, .. }));
        // sin cambio tras el fallo
        assert_eq!(journal.latest_version("ref1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn operations_require_connected_client() {
        let journal = Journal::default();
        assert!(matches!(journal.append_event("E", "r", None, None, None).await, Err(JournalError::NotInitialized)));
        assert!(matches!(journal.list_events("r", None, None).await, Err(JournalError::NotInitialized)));
        // NotInitialized precede a la validación
        assert!(matches!(journal.append_event("", "", None, None, None).await, Err(JournalError::NotInitialized)));
        assert!(matches!(journal.append(AppendRequest::default()).await, Err(JournalError::NotInitialized)));
    }

    #[tokio::test]
    async fn double_connect_is_rejected_and_keeps_first_connection() {
        let mut journal = connected().await;
        journal.append_event("E", "r", None, None, None).await.unwrap();
        let err = journal.create_client(Some("memory"), None).await.err().unwrap();
        assert!(matches!(err, JournalError::AlreadyInitialized));
        // la conexión previa conserva sus datos
        assert_eq!(journal.latest_version("r").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_adapter_is_rejected() {
        let mut journal = Journal::default();
        let err = journal.create_client(Some("cassandra"), None).await.err().unwrap();
        assert!(matches!(err, JournalError::InvalidAdapter(ref n) if n == "cassandra"));
        assert!(!journal.is_connected());
    }

    #[tokio::test]
    async fn adapter_name_falls_back_to_config_and_ignores_case() {
        let mut journal = Journal::new(JournalConfig::new("MeMoRy", ConnectionOptions::new()));
        journal.create_client(None, None).await.unwrap();
        assert_eq!(journal.active_adapter(), Some(AdapterKind::Memory));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let mut journal = connected().await;
        journal.destroy_client().await.unwrap();
        assert!(!journal.is_connected());
        journal.destroy_client().await.unwrap();
        assert!(!journal.is_connected());
        // se puede reconectar tras destruir
        journal.create_client(None, None).await.unwrap();
        assert!(journal.is_connected());
    }

    #[tokio::test]
    async fn validation_errors_surface_before_adapter() {
        let journal = connected().await;
        let err = journal.append_event("  ", "r", None, None, None).await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::MissingEventName));
        let err = journal.append_event("E", "r", Some(json!({"$function": "f"})), None, None).await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::PayloadIsFunction));
        let err = journal.list_events("r", Some(3), Some(1)).await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::RangeInverted { from: 3, to: 1 }));
        assert_eq!(journal.latest_version("r").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn loosely_typed_requests_are_validated_then_delegated() {
        let journal = connected().await;
        let req: AppendRequest = serde_json::from_value(json!({"name": "E", "ref": "r", "expected_version": 1.5})).unwrap();
        let err = journal.append(req).await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::NonIntegerVersion));
        let req: AppendRequest = serde_json::from_value(json!({"name": "E", "ref": "r", "payload": [1, 2]})).unwrap();
        assert_eq!(journal.append(req).await.unwrap().version, 1);
        let list: ListRequest = serde_json::from_value(json!({"ref": "r", "from_version": 1, "to_version": 1})).unwrap();
        assert_eq!(journal.list(list).await.unwrap().len(), 1);
    }

    struct RefusingAdapter;

    #[async_trait]
    impl StorageAdapter for RefusingAdapter {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Memory
        }
        async fn connect(&mut self, _options: &ConnectionOptions) -> Result<(), JournalError> {
            Err(JournalError::adapter("memory", "connection refused"))
        }
        async fn disconnect(&mut self) -> Result<(), JournalError> {
            Err(JournalError::adapter("memory", "socket already closed"))
        }
        async fn append_event(&self, _new_event: NewEvent) -> Result<Event, JournalError> {
            unreachable!("never connected")
        }
        async fn list_events(&self, _reference: &str, _range: VersionRange) -> Result<Vec<Event>, JournalError> {
            unreachable!("never connected")
        }
        async fn latest_version(&self, _reference: &str) -> Result<Version, JournalError> {
            unreachable!("never connected")
        }
    }

    /// Conecta bien pero falla al desconectar.
    struct StickyAdapter(journal_core::InMemoryAdapter);

    #[async_trait]
    impl StorageAdapter for StickyAdapter {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Memory
        }
        async fn connect(&mut self, options: &ConnectionOptions) -> Result<(), JournalError> {
            self.0.connect(options).await
        }
        async fn disconnect(&mut self) -> Result<(), JournalError> {
            Err(JournalError::adapter("memory", "socket already closed"))
        }
        async fn append_event(&self, new_event: NewEvent) -> Result<Event, JournalError> {
            self.0.append_event(new_event).await
        }
        async fn list_events(&self, reference: &str, range: VersionRange) -> Result<Vec<Event>, JournalError> {
            self.0.list_events(reference, range).await
        }
        async fn latest_version(&self, reference: &str) -> Result<Version, JournalError> {
            self.0.latest_version(reference).await
        }
    }

    fn refusing() -> Box<dyn StorageAdapter> {
        Box::new(RefusingAdapter)
    }

    fn sticky() -> Box<dyn StorageAdapter> {
        Box::new(StickyAdapter(journal_core::InMemoryAdapter::new()))
    }

    #[tokio::test]
    async fn connect_failure_is_wrapped_as_initialization_error() {
        let registry = AdapterRegistry::default().with_constructor(AdapterKind::Memory, refusing);
        let mut journal = Journal::with_registry(JournalConfig::default(), registry);
        let err = journal.create_client(None, None).await.err().unwrap();
        assert!(matches!(err, JournalError::Initialization { ref adapter, .. } if adapter == "memory"));
        assert_eq!(err.to_string(), "failed to initialize memory adapter: memory adapter error: connection refused");
        assert!(!journal.is_connected());
    }

    #[tokio::test]
    async fn failed_disconnect_still_leaves_journal_uninitialized() {
        let registry = AdapterRegistry::default().with_constructor(AdapterKind::Memory, sticky);
        let mut journal = Journal::with_registry(JournalConfig::default(), registry);
        journal.create_client(None, None).await.unwrap();
        let err = journal.destroy_client().await.err().unwrap();
        assert!(matches!(err, JournalError::Adapter { .. }));
        assert!(!journal.is_connected());
        assert!(matches!(journal.latest_version("r").await, Err(JournalError::NotInitialized)));
    }
}
