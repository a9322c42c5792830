use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};

use super::{conflict_after_duplicate, AdapterKind, StorageAdapter};
use crate::error::JournalError;
use crate::model::{Event, NewEvent, Version, VersionRange};
use crate::options::ConnectionOptions;

type Streams = HashMap<String, Vec<Event>>;

/// Adapter de referencia en memoria.
///
/// Emula el índice único `(ref, version)`: la verificación de colisión y la
/// inserción ocurren bajo un único lock, sin `.await` intermedio. Sólo una
/// colisión exacta de versión es conflicto, igual que en los backends SQL y
/// documental.
#[derive(Default)]
pub struct InMemoryAdapter {
    streams: Option<Mutex<Streams>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn streams(&self) -> Result<MutexGuard<'_, Streams>, JournalError> {
        let streams = self.streams.as_ref().ok_or_else(|| JournalError::not_connected("memory"))?;
        streams.lock().map_err(|e| JournalError::adapter("memory", format!("poisoned store: {e}")))
    }

    fn latest_in(streams: &Streams, reference: &str) -> Version {
        streams.get(reference).and_then(|events| events.last()).map(|e| e.version).unwrap_or(0)
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn connect(&mut self, _options: &ConnectionOptions) -> Result<(), JournalError> {
        self.streams = Some(Mutex::new(HashMap::new()));
        info!("memory adapter connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), JournalError> {
        self.streams = None;
        info!("memory adapter disconnected");
        Ok(())
    }

    async fn append_event(&self, new_event: NewEvent) -> Result<Event, JournalError> {
        debug!("append:start ref={} event={}", new_event.reference, new_event.name);
        let reference = new_event.reference.clone();
        let expected = match new_event.expected_version {
            Some(v) => v,
            None => self.latest_version(&reference).await?,
        };
        let version = expected.checked_add(1)
                              .ok_or_else(|| JournalError::adapter("memory", "version overflow"))?;
        let inserted = {
            let mut streams = self.streams()?;
            let events = streams.entry(reference.clone()).or_default();
            let pos = events.partition_point(|e| e.version < version);
            if events.get(pos).is_some_and(|e| e.version == version) {
                None
            } else {
                let ev = new_event.into_event(version, Utc::now());
                events.insert(pos, ev.clone());
                Some(ev)
            }
        };
        match inserted {
            Some(ev) => {
                debug!("append:done ref={reference} version={version}");
                Ok(ev)
            }
            None => Err(conflict_after_duplicate(self, &reference, expected).await),
        }
    }

    async fn list_events(&self, reference: &str, range: VersionRange) -> Result<Vec<Event>, JournalError> {
        let streams = self.streams()?;
        let events: Vec<Event> = streams.get(reference)
                                        .map(|evs| evs.iter().filter(|e| range.contains(e.version)).cloned().collect())
                                        .unwrap_or_default();
        debug!("list:done ref={reference} count={}", events.len());
        Ok(events)
    }

    async fn latest_version(&self, reference: &str) -> Result<Version, JournalError> {
        let streams = self.streams()?;
        Ok(Self::latest_in(&streams, reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn connected() -> InMemoryAdapter {
        let mut adapter = InMemoryAdapter::new();
        adapter.connect(&ConnectionOptions::new()).await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn operations_fail_before_connect() {
        let adapter = InMemoryAdapter::new();
        let err = adapter.latest_version("r").await.unwrap_err();
        assert!(matches!(err, JournalError::Adapter { .. }));
        assert!(adapter.append_event(NewEvent::new("E", "r")).await.is_err());
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts_only_on_exact_collision() {
        let adapter = connected().await;
        for _ in 0..3 {
            adapter.append_event(NewEvent::new("E", "r")).await.unwrap();
        }
        // expected=1 -> versión 2 ya existe
        let err = adapter.append_event(NewEvent::new("E", "r").expecting(1)).await.unwrap_err();
        assert!(matches!(err, JournalError::Conflict { expected_version: 1, actual_version: 3, .. }));
        // expected=4 -> versión 5 libre (gap tolerado)
        let ev = adapter.append_event(NewEvent::new("E", "r").expecting(4)).await.unwrap();
        assert_eq!(ev.version, 5);
        assert_eq!(adapter.latest_version("r").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn gap_filling_keeps_ascending_order() {
        let adapter = connected().await;
        adapter.append_event(NewEvent::new("A", "r")).await.unwrap();
        adapter.append_event(NewEvent::new("C", "r").expecting(2)).await.unwrap();
        adapter.append_event(NewEvent::new("B", "r").expecting(1).with_payload(json!([1, 2]))).await.unwrap();
        let versions: Vec<Version> =
            adapter.list_events("r", VersionRange::all()).await.unwrap().iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn max_expected_version_overflows_without_writing() {
        let adapter = connected().await;
        let err = adapter.append_event(NewEvent::new("E", "r").expecting(u64::MAX)).await.unwrap_err();
        assert!(matches!(err, JournalError::Adapter { ref backend, .. } if backend == "memory"));
        assert_eq!(adapter.latest_version("r").await.unwrap(), 0);
        assert_eq!(adapter.append_event(NewEvent::new("E", "r")).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn disconnect_discards_store() {
        let mut adapter = connected().await;
        adapter.append_event(NewEvent::new("E", "r")).await.unwrap();
        adapter.disconnect().await.unwrap();
        assert!(adapter.list_events("r", VersionRange::all()).await.is_err());
    }

    #[tokio::test]
    async fn passes_conformance_suite() {
        let adapter = connected().await;
        crate::conformance::run_all(&adapter, || uuid::Uuid::new_v4().to_string()).await;
    }
}
