//! Persistence layer for the knowledge mesh.
//!
//! Three narrow store traits (registry rows, policy documents, audit events)
//! plus a bundle trait for consumers that need all of them. The in-memory
//! backend is the default; the `postgres` feature adds a `sqlx`-backed
//! backend with migration-versioned schema setup.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use traits::{AgentFilter, AuditStore, KbFilter, MeshStore, PolicyStore, RegistryStore};
