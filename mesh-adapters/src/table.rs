//! In-memory table backend.
//!
//! Serves the Postgres vocabulary from canned rows, for tests, demos, and
//! wiring checks against a mesh with no real database behind it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use mesh_primitives::KbType;
use serde_json::{Value, json};

use crate::backend::KbBackend;
use crate::{AdapterError, AdapterResult};

/// Deterministic backend holding rows per table name.
#[derive(Debug, Clone, Default)]
pub struct TableBackend {
    tables: BTreeMap<String, Vec<Value>>,
    default_table: Option<String>,
}

impl TableBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table of rows. The first table added becomes the default
    /// target for `sql_query` when no `table` parameter is supplied.
    #[must_use]
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        let name = name.into();
        if self.default_table.is_none() {
            self.default_table = Some(name.clone());
        }
        self.tables.insert(name, rows);
        self
    }

    fn resolve_table<'a>(&'a self, params: &'a Value) -> AdapterResult<&'a str> {
        if let Some(name) = params.get("table").and_then(Value::as_str) {
            return Ok(name);
        }
        self.default_table
            .as_deref()
            .ok_or_else(|| AdapterError::invalid_params("no table configured"))
    }
}

#[async_trait]
impl KbBackend for TableBackend {
    fn kb_type(&self) -> KbType {
        KbType::Postgres
    }

    fn operations(&self) -> Vec<String> {
        vec![
            "sql_query".to_owned(),
            "execute_sql".to_owned(),
            "get_schema".to_owned(),
        ]
    }

    async fn execute(&self, operation: &str, params: &Value) -> AdapterResult<Value> {
        match operation {
            "sql_query" => {
                let table = self.resolve_table(params)?;
                let rows = self.tables.get(table).ok_or_else(|| {
                    AdapterError::backend(format!("relation `{table}` does not exist"))
                })?;
                Ok(json!({ "rows": rows, "row_count": rows.len() }))
            }
            "execute_sql" => {
                let statement = params
                    .get("sql")
                    .or_else(|| params.get("query"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| AdapterError::invalid_params("missing `sql` parameter"))?;
                Ok(json!({ "rows_affected": 0, "statement": statement }))
            }
            "get_schema" => {
                let tables: BTreeMap<&String, usize> = self
                    .tables
                    .iter()
                    .map(|(name, rows)| (name, rows.len()))
                    .collect();
                Ok(json!({ "tables": tables }))
            }
            other => Err(AdapterError::backend(format!(
                "operation `{other}` reached the backend without a handler"
            ))),
        }
    }
}
