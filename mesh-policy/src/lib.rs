//! Policy evaluation for the knowledge mesh.
//!
//! The mesh never interprets policies itself: every governed request is
//! authorized by an evaluator behind the [`PolicyEvaluator`] trait. The
//! production binding is an OPA HTTP client; a rule-based in-process
//! evaluator covers tests and offline deployments. Both fail closed.
//!
//! This crate also owns response masking and the policy admin surface
//! (upload/list/delete with the on-disk `.rego` mirror).

#![warn(missing_docs, clippy::pedantic)]

mod admin;
mod cache;
mod decision;
mod evaluator;
mod http_client;
mod masking;
mod opa;
mod rules;
pub mod wire;

pub use admin::PolicyAdmin;
pub use cache::CachingEvaluator;
pub use decision::{DecisionInput, PolicyDecision};
pub use evaluator::{PolicyError, PolicyEvaluator, PolicyResult};
pub use masking::mask;
pub use opa::{OpaClient, OpaConfig};
pub use rules::{PolicyRule, RuleBasedEvaluator, RuleDocument, RuleEffect};
