//! Operation vocabularies, fixed per backend type.
//!
//! The registry validates the `operations` set of every registration against
//! these lists, so adapter workers never see an operation name they did not
//! enumerate at startup.

use crate::kb::KbType;
use crate::{Error, Result};

/// Operations an agent may advertise.
pub const AGENT_OPERATIONS: &[&str] = &["publish", "query", "subscribe", "invoke", "execute"];

const POSTGRES_OPERATIONS: &[&str] = &["sql_query", "execute_sql", "get_schema"];
const NEO4J_OPERATIONS: &[&str] = &[
    "cypher_query",
    "create_node",
    "create_relationship",
    "find_node",
];

/// Returns the authoritative operation vocabulary for a backend type.
#[must_use]
pub const fn kb_operations(kb_type: KbType) -> &'static [&'static str] {
    match kb_type {
        KbType::Postgres => POSTGRES_OPERATIONS,
        KbType::Neo4j => NEO4J_OPERATIONS,
    }
}

/// Validates that every requested operation exists in the backend vocabulary.
///
/// # Errors
///
/// Returns [`Error::UnknownOperation`] naming the first unknown operation and
/// echoing the allowed set.
pub fn validate_kb_operations(kb_type: KbType, operations: &[String]) -> Result<()> {
    let allowed = kb_operations(kb_type);
    for operation in operations {
        if !allowed.contains(&operation.as_str()) {
            return Err(Error::UnknownOperation {
                target: kb_type.as_str().to_owned(),
                operation: operation.clone(),
                allowed: allowed.to_vec(),
            });
        }
    }
    Ok(())
}

/// Validates that every requested operation exists in the agent vocabulary.
///
/// # Errors
///
/// Returns [`Error::UnknownOperation`] naming the first unknown operation and
/// echoing the allowed set.
pub fn validate_agent_operations(operations: &[String]) -> Result<()> {
    for operation in operations {
        if !AGENT_OPERATIONS.contains(&operation.as_str()) {
            return Err(Error::UnknownOperation {
                target: "agent".to_owned(),
                operation: operation.clone(),
                allowed: AGENT_OPERATIONS.to_vec(),
            });
        }
    }
    Ok(())
}
