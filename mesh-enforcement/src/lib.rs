//! Request routing and policy enforcement.
//!
//! This is the governance core of the mesh. The router demultiplexes the
//! `mesh.*` request subjects; the enforcement service authorizes every
//! governed request against the policy evaluator, dispatches authorized
//! work to adapter workers or target agents, masks replies, and writes the
//! audit row before any reply leaves the process.

#![warn(missing_docs, clippy::pedantic)]

mod invocation;
mod pool;
mod router;
mod service;
pub mod wire;

pub use invocation::{InvocationError, InvocationEvent, InvocationLifecycle, InvocationState};
pub use pool::HandlerPool;
pub use router::MeshRouter;
pub use service::{EnforcementConfig, EnforcementService};
