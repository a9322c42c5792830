//! Adapter documental (MongoDB).
//!
//! - Los refs deben ser ObjectId hex de 24 caracteres.
//! - `connect` asegura el índice único `{ref: 1, version: 1}`; la violación
//!   (código 11000) es el conflicto de concurrencia.
//! - Cada documento: `{_id, ref, version, event, payload, initiated_by, created_on}`.
//! - `payload` se guarda como texto JSON: claves `$...` y enteros u64 no
//!   pasan por la conversión a BSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use log::{debug, info};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{ClientOptions, FindOneOptions, FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

use journal_core::adapter::{conflict_after_duplicate, AdapterKind, StorageAdapter};
use journal_core::{ConnectionOptions, Event, JournalError, NewEvent, Version, VersionRange};

use crate::error::PersistenceError;
use crate::relational::to_db_version;

const BACKEND: &str = "document";

pub fn default_options() -> ConnectionOptions {
    ConnectionOptions::new().with("host", "localhost")
                            .with("port", 27017)
                            .with("database", "journal")
                            .with("collection", "events")
                            .with("pool_size", 10)
}

pub fn connection_url(opts: &ConnectionOptions) -> String {
    if let Some(url) = opts.get_str("url") {
        return url;
    }
    format!("mongodb://{}:{}",
            opts.get_str("host").unwrap_or_default(),
            opts.get_str("port").unwrap_or_default())
}

/// Valida el formato del ref para este backend.
pub fn parse_ref(reference: &str) -> Result<ObjectId, JournalError> {
    ObjectId::parse_str(reference).map_err(|e| JournalError::InvalidRef { reference: reference.to_string(),
                                                                          reason: format!("expected 24-char hex object id: {e}") })
}

fn to_document(oid: ObjectId, version: i64, new_event: NewEvent) -> Result<Document, PersistenceError> {
    let mut document = doc! {
        "_id": ObjectId::new(),
        "ref": oid,
        "version": version,
        "event": new_event.name,
        "created_on": BsonDateTime::now(),
    };
    if let Some(payload) = &new_event.payload {
        let text = serde_json::to_string(payload).map_err(|e| PersistenceError::InvalidData(format!("payload: {e}")))?;
        document.insert("payload", text);
    }
    if let Some(actor) = new_event.initiated_by {
        document.insert("initiated_by", actor);
    }
    Ok(document)
}

fn from_document(document: &Document) -> Result<Event, PersistenceError> {
    let invalid = |e: bson::document::ValueAccessError| PersistenceError::InvalidData(format!("document field: {e}"));
    let version = document.get_i64("version").map_err(invalid)?;
    let millis = document.get_datetime("created_on").map_err(invalid)?.timestamp_millis();
    let payload = match document.get("payload") {
        None | Some(Bson::Null) => None,
        Some(Bson::String(text)) => {
            Some(serde_json::from_str(text).map_err(|e| PersistenceError::InvalidData(format!("payload: {e}")))?)
        }
        Some(other) => return Err(PersistenceError::InvalidData(format!("payload: expected JSON text, got {other}"))),
    };
    Ok(Event { reference: document.get_object_id("ref").map_err(invalid)?.to_hex(),
               version: Version::try_from(version).map_err(|_| PersistenceError::InvalidData(format!("negative version {version}")))?,
               event: document.get_str("event").map_err(invalid)?.to_string(),
               payload,
               initiated_by: document.get_str("initiated_by").ok().map(str::to_string),
               created_on: DateTime::<Utc>::from_timestamp_millis(millis)
                   .ok_or_else(|| PersistenceError::InvalidData(format!("created_on out of range: {millis}")))? })
}

#[derive(Default)]
pub struct DocumentAdapter {
    client: Option<Client>,
    collection: Option<Collection<Document>>,
}

impl DocumentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self) -> Result<&Collection<Document>, JournalError> {
        self.collection.as_ref().ok_or_else(|| JournalError::not_connected(BACKEND))
    }
}

#[async_trait]
impl StorageAdapter for DocumentAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Document
    }

    async fn connect(&mut self, options: &ConnectionOptions) -> Result<(), JournalError> {
        let opts = options.merged_over(&default_options());
        let mut client_options = ClientOptions::parse(connection_url(&opts)).await
                                                                            .map_err(|e| PersistenceError::from(e).into_journal(BACKEND))?;
        client_options.max_pool_size = opts.get_u32("pool_size");
        client_options.app_name = Some("event-journal".to_string());
        let client = Client::with_options(client_options).map_err(|e| PersistenceError::from(e).into_journal(BACKEND))?;
        let database = opts.get_str("database").unwrap_or_else(|| "journal".to_string());
        let name = opts.get_str("collection").unwrap_or_else(|| "events".to_string());
        let collection = client.database(&database).collection::<Document>(&name);
        let index = IndexModel::builder().keys(doc! { "ref": 1, "version": 1 })
                                         .options(IndexOptions::builder().unique(true).build())
                                         .build();
        collection.create_index(index, None)
                  .await
                  .map_err(|e| PersistenceError::from(e).into_journal(BACKEND))?;
        info!("document adapter connected db={database} collection={name}");
        self.client = Some(client);
        self.collection = Some(collection);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), JournalError> {
        self.collection = None;
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            info!("document adapter disconnected");
        }
        Ok(())
    }

    async fn append_event(&self, new_event: NewEvent) -> Result<Event, JournalError> {
        debug!("append:start ref={} event={}", new_event.reference, new_event.name);
        let oid = parse_ref(&new_event.reference)?;
        let collection = self.collection()?;
        let reference = new_event.reference.clone();
        let expected = match new_event.expected_version {
            Some(v) => v,
            None => self.latest_version(&reference).await?,
        };
        let version = to_db_version(expected.saturating_add(1)).map_err(|e| e.into_journal(BACKEND))?;
        let document = to_document(oid, version, new_event).map_err(|e| e.into_journal(BACKEND))?;
        match collection.insert_one(&document, None).await.map_err(PersistenceError::from) {
            Ok(_) => {
                debug!("append:done ref={reference} version={version}");
                from_document(&document).map_err(|e| e.into_journal(BACKEND))
            }
            Err(PersistenceError::UniqueViolation(_)) => Err(conflict_after_duplicate(self, &reference, expected).await),
            Err(e) => Err(e.into_journal(BACKEND)),
        }
    }

    async fn list_events(&self, reference: &str, range: VersionRange) -> Result<Vec<Event>, JournalError> {
        let oid = parse_ref(reference)?;
        let collection = self.collection()?;
        let from = match range.from.map(i64::try_from).transpose() {
            Ok(from) => from,
            Err(_) => return Ok(Vec::new()),
        };
        let mut filter = doc! { "ref": oid };
        let mut bounds = Document::new();
        if let Some(from) = from {
            bounds.insert("$gte", from);
        }
        if let Some(to) = range.to.and_then(|t| i64::try_from(t).ok()) {
            bounds.insert("$lte", to);
        }
        if !bounds.is_empty() {
            filter.insert("version", bounds);
        }
        let options = FindOptions::builder().sort(doc! { "version": 1 }).build();
        let documents: Vec<Document> = collection.find(filter, options)
                                                 .await
                                                 .map_err(|e| PersistenceError::from(e).into_journal(BACKEND))?
                                                 .try_collect()
                                                 .await
                                                 .map_err(|e| PersistenceError::from(e).into_journal(BACKEND))?;
        let events = documents.iter()
                              .map(from_document)
                              .collect::<Result<Vec<_>, _>>()
                              .map_err(|e| e.into_journal(BACKEND))?;
        debug!("list:done ref={reference} count={}", events.len());
        Ok(events)
    }

    async fn latest_version(&self, reference: &str) -> Result<Version, JournalError> {
        let oid = parse_ref(reference)?;
        let options = FindOneOptions::builder().sort(doc! { "version": -1 })
                                               .projection(doc! { "version": 1 })
                                               .build();
        let latest = self.collection()?
                         .find_one(doc! { "ref": oid }, options)
                         .await
                         .map_err(|e| PersistenceError::from(e).into_journal(BACKEND))?;
        match latest {
            None => Ok(0),
            Some(d) => d.get_i64("version")
                        .map(|v| v.max(0) as Version)
                        .map_err(|e| JournalError::adapter(BACKEND, format!("document field: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn refs_must_be_object_ids() {
        assert!(parse_ref("65a1f0c2e4b0a1b2c3d4e5f6").is_ok());
        let err = parse_ref("ref1").unwrap_err();
        assert!(matches!(err, JournalError::InvalidRef { ref reference, .. } if reference == "ref1"));
    }

    #[test]
    fn url_defaults_to_local_server() {
        let opts = ConnectionOptions::new().merged_over(&default_options());
        assert_eq!(connection_url(&opts), "mongodb://localhost:27017");
    }

    #[test]
    fn document_mapping_keeps_logical_fields() {
        let oid = ObjectId::new();
        let new_event = NewEvent::new("Created", oid.to_hex()).with_payload(json!({"a": 1, "tags": ["x"]}))
                                                              .initiated_by("alice");
        let document = to_document(oid, 3, new_event).unwrap();
        let ev = from_document(&document).unwrap();
        assert_eq!(ev.reference, oid.to_hex());
        assert_eq!(ev.version, 3);
        assert_eq!(ev.event, "Created");
        assert_eq!(ev.payload, Some(json!({"a": 1, "tags": ["x"]})));
        assert_eq!(ev.initiated_by.as_deref(), Some("alice"));
    }

    #[test]
    fn payload_keeps_dollar_keys_and_unsigned_integers() {
        let oid = ObjectId::new();
        let payload = json!({"$date": {"$numberLong": "0"}, "n": u64::MAX, "nested": [{"$oid": "x"}]});
        let document = to_document(oid, 1, NewEvent::new("E", oid.to_hex()).with_payload(payload.clone())).unwrap();
        assert_eq!(from_document(&document).unwrap().payload, Some(payload));
    }

    #[test]
    fn absent_payload_is_not_stored() {
        let oid = ObjectId::new();
        let document = to_document(oid, 1, NewEvent::new("E", oid.to_hex())).unwrap();
        assert!(!document.contains_key("payload"));
        assert_eq!(from_document(&document).unwrap().payload, None);
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let adapter = DocumentAdapter::new();
        let err = adapter.latest_version(&ObjectId::new().to_hex()).await.unwrap_err();
        assert!(matches!(err, JournalError::Adapter { .. }));
    }
}
