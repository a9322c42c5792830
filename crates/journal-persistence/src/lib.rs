//! journal-persistence
//!
//! Adapters de almacenamiento con backend real:
//! - `relational`: PostgreSQL vía Diesel + r2d2, migraciones embebidas.
//! - `document`: MongoDB con índice único `(ref, version)`.
//! - `error`: clasificación de errores de driver (unicidad vs. genérico).

pub mod document;
pub mod error;
pub mod migrations;
pub mod relational;
pub mod schema; // escrito a mano

pub use document::DocumentAdapter;
pub use error::PersistenceError;
pub use relational::{build_pool, PgPool, RelationalAdapter};
