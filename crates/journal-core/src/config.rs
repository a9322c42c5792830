//! Configuración del `Journal` desde variables de entorno.
//! `.env` se carga una sola vez; sólo las variables definidas pasan a ser
//! overrides del llamador, el resto lo completan los defaults del backend.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::options::ConnectionOptions;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

pub const DEFAULT_ADAPTER: &str = "memory";

/// Configuración inmutable de un `Journal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalConfig {
    pub adapter_name: String,
    #[serde(default)]
    pub db_connection_options: ConnectionOptions,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { adapter_name: DEFAULT_ADAPTER.to_string(), db_connection_options: ConnectionOptions::new() }
    }
}

impl JournalConfig {
    pub fn new(adapter_name: impl Into<String>, db_connection_options: ConnectionOptions) -> Self {
        Self { adapter_name: adapter_name.into(), db_connection_options }
    }

    /// Lee `JOURNAL_ADAPTER` y las variables del backend correspondiente.
    pub fn from_env() -> Self {
        init_dotenv();
        let adapter_name = env::var("JOURNAL_ADAPTER").unwrap_or_else(|_| DEFAULT_ADAPTER.to_string());
        let mut opts = ConnectionOptions::new();
        match adapter_name.to_ascii_lowercase().as_str() {
            "relational" | "postgres" | "pg" | "sql" => {
                copy_var(&mut opts, "DATABASE_URL", "url");
                copy_var(&mut opts, "DATABASE_MAX_CONNECTIONS", "pool_size");
                copy_var(&mut opts, "DATABASE_MIN_CONNECTIONS", "min_idle");
            }
            "document" | "mongo" | "mongodb" => {
                copy_var(&mut opts, "MONGODB_URL", "url");
                copy_var(&mut opts, "MONGODB_DATABASE", "database");
                copy_var(&mut opts, "MONGODB_COLLECTION", "collection");
                copy_var(&mut opts, "MONGODB_MAX_POOL_SIZE", "pool_size");
            }
            _ => {}
        }
        Self { adapter_name, db_connection_options: opts }
    }
}

fn copy_var(opts: &mut ConnectionOptions, var: &str, key: &str) {
    if let Ok(v) = env::var(var) {
        if !v.trim().is_empty() {
            opts.insert(key, v);
        }
    }
}
