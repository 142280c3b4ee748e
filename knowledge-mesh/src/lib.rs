//! Knowledge-mesh broker facade.
//!
//! Depend on this crate via `cargo add knowledge-mesh`. It bundles the mesh
//! crates behind feature flags so deployments can enable only the pieces
//! they run: a full broker, a standalone adapter worker, or just the wire
//! types for a client.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use mesh_primitives as primitives;

/// Named-subject transport (enabled by `transport` feature; add `nats` for
/// the NATS binding).
#[cfg(feature = "transport")]
pub use mesh_transport as transport;

/// Registry, policy, and audit stores (enabled by `store` feature; add
/// `postgres` for the sqlx backend).
#[cfg(feature = "store")]
pub use mesh_store as store;

/// Policy evaluation, masking, and administration (enabled by `policy`
/// feature).
#[cfg(feature = "policy")]
pub use mesh_policy as policy;

/// Registry, directory, and health monitoring (enabled by `registry`
/// feature).
#[cfg(feature = "registry")]
pub use mesh_registry as registry;

/// Adapter workers fronting knowledge bases (enabled by `adapters`
/// feature).
#[cfg(feature = "adapters")]
pub use mesh_adapters as adapters;

/// Request routing and enforcement (enabled by `enforcement` feature).
#[cfg(feature = "enforcement")]
pub use mesh_enforcement as enforcement;

/// Process configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use mesh_config as config;

/// Structured logging bootstrap (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use mesh_telemetry as telemetry;
