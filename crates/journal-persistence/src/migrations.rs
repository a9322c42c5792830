//! Wrapper para correr migraciones embebidas.
//!
//! Las migraciones viven en `migrations/` de este crate; la tabla
//! `journal_events` declara `UNIQUE (ref, version)`, que es el punto de
//! serialización de appends concurrentes.

use diesel::pg::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::PersistenceError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_pending_migrations(conn: &mut PgConnection) -> Result<(), PersistenceError> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| log::info!("migrations applied: {}", applied.len()))
        .map_err(|e| PersistenceError::Unknown(format!("migration error: {e}")))
}
