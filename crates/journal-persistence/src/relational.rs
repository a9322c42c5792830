//! Adapter relacional (PostgreSQL vía Diesel + r2d2).
//!
//! - `append_event` inserta con `version = expected + 1`; el constraint
//!   `UNIQUE (ref, version)` decide el ganador entre appends concurrentes.
//! - Las llamadas Diesel son bloqueantes: cada operación corre en
//!   `spawn_blocking`, y ese es su único punto de suspensión.
//! - El pool se construye en `connect` y ejecuta las migraciones pendientes
//!   una sola vez.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, info};
use serde_json::Value;

use journal_core::adapter::{conflict_after_duplicate, AdapterKind, StorageAdapter};
use journal_core::{ConnectionOptions, Event, JournalError, NewEvent, Version, VersionRange};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::journal_events;

const BACKEND: &str = "relational";

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Fila mapeada de `journal_events` (orden de columnas del esquema).
#[derive(Queryable, Debug)]
pub struct EventRow {
    pub id: i64,
    pub reference: String,
    pub version: i64,
    pub event: String,
    pub payload: Option<Value>,
    pub initiated_by: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> Result<Event, PersistenceError> {
        let version = Version::try_from(self.version)
            .map_err(|_| PersistenceError::InvalidData(format!("negative version {} (id={})", self.version, self.id)))?;
        Ok(Event { reference: self.reference,
                   version,
                   event: self.event,
                   payload: self.payload,
                   initiated_by: self.initiated_by,
                   created_on: self.created_on })
    }
}

/// Fila para inserción; `id` lo asigna BIGSERIAL.
#[derive(Insertable, Debug)]
#[diesel(table_name = journal_events)]
pub struct NewEventRow {
    pub ref_: String,
    pub version: i64,
    pub event: String,
    pub payload: Option<Value>,
    pub initiated_by: Option<String>,
    pub created_on: DateTime<Utc>,
}

pub(crate) fn to_db_version(version: Version) -> Result<i64, PersistenceError> {
    i64::try_from(version).map_err(|_| PersistenceError::InvalidData(format!("version {version} out of range")))
}

/// Defaults del backend; las opciones del llamador los sobrescriben.
pub fn default_options() -> ConnectionOptions {
    ConnectionOptions::new().with("host", "localhost")
                            .with("port", 5432)
                            .with("database", "journal")
                            .with("user", "postgres")
                            .with("password", "postgres")
                            .with("pool_size", 10)
                            .with("min_idle", 1)
                            .with("connect_timeout_secs", 30)
}

/// URL de conexión: `url` explícita o compuesta desde host/puerto/base.
pub fn database_url(opts: &ConnectionOptions) -> String {
    if let Some(url) = opts.get_str("url") {
        return url;
    }
    let get = |k: &str| opts.get_str(k).unwrap_or_default();
    format!("postgres://{}:{}@{}:{}/{}",
            get("user"),
            get("password"),
            get("host"),
            get("port"),
            get("database"))
}

/// Construye un pool r2d2 y corre las migraciones pendientes.
///
/// Si `min_size > max_size` se usa `min_size = max_size`.
pub fn build_pool(database_url: &str,
                  min_size: u32,
                  max_size: u32,
                  connection_timeout: Duration)
                  -> Result<PgPool, PersistenceError> {
    let max_size = max_size.max(1);
    if min_size > max_size {
        log::warn!("min_idle > pool_size ({min_size} > {max_size}), ajustando min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min_size.min(max_size)))
                                    .max_size(max_size)
                                    .connection_timeout(connection_timeout)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

#[derive(Default)]
pub struct RelationalAdapter {
    pool: Option<PgPool>,
}

impl RelationalAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ejecuta `f` con una conexión del pool fuera del runtime async.
    async fn blocking<T, F>(&self, f: F) -> Result<T, PersistenceError>
        where T: Send + 'static,
              F: FnOnce(&mut PgConnection) -> Result<T, PersistenceError> + Send + 'static
    {
        let pool = self.pool.clone().ok_or(PersistenceError::NotConnected)?;
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        }).await
          .map_err(|e| PersistenceError::Unknown(format!("blocking task: {e}")))?
    }
}

#[async_trait]
impl StorageAdapter for RelationalAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Relational
    }

    async fn connect(&mut self, options: &ConnectionOptions) -> Result<(), JournalError> {
        let opts = options.merged_over(&default_options());
        let url = database_url(&opts);
        let min = opts.get_u32("min_idle").unwrap_or(1);
        let max = opts.get_u32("pool_size").unwrap_or(10);
        let timeout = Duration::from_secs(opts.get_u32("connect_timeout_secs").unwrap_or(30).into());
        let pool = tokio::task::spawn_blocking(move || build_pool(&url, min, max, timeout))
            .await
            .map_err(|e| JournalError::adapter(BACKEND, format!("blocking task: {e}")))?
            .map_err(|e| e.into_journal(BACKEND))?;
        self.pool = Some(pool);
        info!("relational adapter connected (pool_size={max})");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), JournalError> {
        // r2d2 cierra las conexiones al soltar el último handle del pool.
        if self.pool.take().is_some() {
            info!("relational adapter disconnected");
        }
        Ok(())
    }

    async fn append_event(&self, new_event: NewEvent) -> Result<Event, JournalError> {
        debug!("append:start ref={} event={}", new_event.reference, new_event.name);
        let reference = new_event.reference.clone();
        let expected = match new_event.expected_version {
            Some(v) => v,
            None => self.latest_version(&reference).await?,
        };
        let row = NewEventRow { ref_: new_event.reference,
                                version: to_db_version(expected.saturating_add(1)).map_err(|e| e.into_journal(BACKEND))?,
                                event: new_event.name,
                                payload: new_event.payload,
                                initiated_by: new_event.initiated_by,
                                created_on: Utc::now() };
        let inserted = self.blocking(move |conn| {
                               diesel::insert_into(journal_events::table).values(&row)
                                                                         .get_result::<EventRow>(conn)
                                                                         .map_err(PersistenceError::from)
                                                                         .and_then(EventRow::into_event)
                           })
                           .await;
        match inserted {
            Ok(ev) => {
                debug!("append:done ref={reference} version={}", ev.version);
                Ok(ev)
            }
            Err(PersistenceError::UniqueViolation(_)) => Err(conflict_after_duplicate(self, &reference, expected).await),
            Err(e) => Err(e.into_journal(BACKEND)),
        }
    }

    async fn list_events(&self, reference: &str, range: VersionRange) -> Result<Vec<Event>, JournalError> {
        if self.pool.is_none() {
            return Err(JournalError::not_connected(BACKEND));
        }
        // `from` fuera de rango i64 no puede coincidir con ninguna versión almacenada.
        let from = match range.from.map(i64::try_from).transpose() {
            Ok(from) => from,
            Err(_) => return Ok(Vec::new()),
        };
        let reference = reference.to_string();
        // `to` fuera de rango i64 equivale a no acotar.
        let to = range.to.and_then(|t| i64::try_from(t).ok());
        let events = self.blocking(move |conn| {
                             let mut query = journal_events::table.filter(journal_events::ref_.eq(reference.as_str()))
                                                                  .into_boxed();
                             if let Some(f) = from {
                                 query = query.filter(journal_events::version.ge(f));
                             }
                             if let Some(t) = to {
                                 query = query.filter(journal_events::version.le(t));
                             }
                             let rows: Vec<EventRow> = query.order(journal_events::version.asc()).load(conn)?;
                             rows.into_iter().map(EventRow::into_event).collect::<Result<Vec<_>, _>>()
                         })
                         .await
                         .map_err(|e| e.into_journal(BACKEND))?;
        debug!("list:done count={}", events.len());
        Ok(events)
    }

    async fn latest_version(&self, reference: &str) -> Result<Version, JournalError> {
        let reference = reference.to_string();
        let latest: Option<i64> = self.blocking(move |conn| {
                                          journal_events::table.filter(journal_events::ref_.eq(reference.as_str()))
                                                               .select(journal_events::version)
                                                               .order(journal_events::version.desc())
                                                               .first::<i64>(conn)
                                                               .optional()
                                                               .map_err(PersistenceError::from)
                                      })
                                      .await
                                      .map_err(|e| e.into_journal(BACKEND))?;
        Ok(latest.map(|v| v.max(0) as Version).unwrap_or(0))
    }
}
