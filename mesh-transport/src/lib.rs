//! Named-subject transport for the knowledge mesh.
//!
//! The mesh speaks over subjects: request/reply for registry, directory,
//! routing, and adapter dispatch; pub/sub for directory updates and
//! invocation completions. Delivery is at-most-once and every request
//! carries an explicit timeout. The in-memory broker is the default and
//! mirrors NATS semantics (wildcard subscriptions, reply inboxes); the
//! `nats` feature binds the same trait to a real NATS cluster.

#![warn(missing_docs, clippy::pedantic)]

mod memory;
#[cfg(feature = "nats")]
mod nats;
pub mod subject;
mod traits;

pub use memory::InMemoryTransport;
#[cfg(feature = "nats")]
pub use nats::NatsTransport;
pub use traits::{Delivery, DeliveryStream, Transport, TransportError, TransportResult};
