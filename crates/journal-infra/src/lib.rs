//! journal-infra: une el core con los backends persistentes.
//!
//! - `registry`: `AdapterKind` -> constructor de adapter.
//! - `journal`: fachada `Journal` (validación + ciclo de vida del adapter).

pub mod journal;
pub mod registry;

pub use journal::Journal;
pub use registry::{AdapterConstructor, AdapterRegistry};
