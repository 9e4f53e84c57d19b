//! Embedded SQL executor (§4.4 "database").
//!
//! Only the file-backed store under [`RuntimeConfig::dbs_root`] is
//! reachable; there is no network database path. `rusqlite` (bundled)
//! backs the store so no system SQLite is required.

use std::time::Instant;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::error::EngineError;
use crate::executor::NodeExecutor;
use crate::placeholder;
use crate::runtime::RuntimeConfig;

fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        Value::Integer(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Array(_) | Value::Object(_) => {
            SqlValue::Text(serde_json::to_string(&value.to_json()).unwrap_or_default())
        }
    }
}

fn sql_row_to_value(row: &rusqlite::Row, columns: &[String]) -> rusqlite::Result<Value> {
    let mut out = ValueMap::new();
    for (idx, name) in columns.iter().enumerate() {
        let value: SqlValue = row.get(idx)?;
        let v = match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(n) => Value::Integer(n),
            SqlValue::Real(f) => Value::Float(f),
            SqlValue::Text(s) => Value::String(s),
            SqlValue::Blob(b) => Value::Bytes(b),
        };
        out.insert(name.clone(), v);
    }
    Ok(Value::Object(out))
}

/// Vector-search queries are identified by `MATCH` over a vector-indexed
/// virtual table, or by a table name matching the `vec0`-style naming
/// convention the extension ships with (§4.4).
fn looks_like_vector_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    lower.contains("match") && (lower.contains("vec0") || lower.contains("_vec"))
}

/// Coerce a raw-bytes or base64 vector parameter to the JSON array literal
/// string the vector extension binds natively.
fn coerce_vector_param(value: &Value) -> Value {
    let bytes = match value {
        Value::Bytes(b) => Some(b.clone()),
        Value::String(s) => base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s).ok(),
        _ => None,
    };
    let Some(bytes) = bytes else { return value.clone() };
    if bytes.len() % 4 != 0 {
        return value.clone();
    }
    let floats: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Value::String(serde_json::to_string(&floats).unwrap_or_default())
}

fn load_vector_extension(conn: &rusqlite::Connection, path: &std::path::Path) -> Result<(), EngineError> {
    if !path.exists() {
        return Err(EngineError::Policy(format!(
            "vector-search extension not found at {} and this build cannot auto-load it",
            path.display()
        )));
    }
    unsafe {
        conn.load_extension_enable()
            .map_err(|e| EngineError::Policy(format!("extension loading unsupported: {e}")))?;
        let result = conn.load_extension(&path, None::<&str>);
        conn.load_extension_disable().ok();
        result.map_err(|e| EngineError::Policy(format!("failed to load vector extension: {e}")))?;
    }
    Ok(())
}

fn run_statement(
    conn: &rusqlite::Connection,
    statement: &str,
    params: &[SqlValue],
    operation: &str,
) -> Result<Value, EngineError> {
    let mut stmt = conn
        .prepare(statement)
        .map_err(|e| EngineError::UserCode(format!("sql parse error: {e}")))?;
    let placeholder_count = stmt.parameter_count();
    let bound: Vec<&dyn rusqlite::ToSql> =
        params.iter().take(placeholder_count).map(|v| v as &dyn rusqlite::ToSql).collect();

    if operation == "select" {
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map(bound.as_slice(), |row| sql_row_to_value(row, &columns))
            .map_err(|e| EngineError::UserCode(format!("sql execution error: {e}")))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| EngineError::UserCode(format!("sql row error: {e}")))?);
        }
        Ok(Value::Array(out))
    } else {
        let affected = stmt
            .execute(bound.as_slice())
            .map_err(|e| EngineError::UserCode(format!("sql execution error: {e}")))?;
        Ok(Value::Integer(affected as i64))
    }
}

pub struct DatabaseExecutor;

#[async_trait]
impl NodeExecutor for DatabaseExecutor {
    fn node_type(&self) -> &str {
        "database"
    }

    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        if let Err(e) = config.ensure_roots() {
            return NodeOutcome::error(
                format!("failed to prepare database sandbox: {e}"),
                started.elapsed().as_secs_f64(),
            );
        }

        let empty = ValueMap::new();
        let input_map = input.as_map().unwrap_or(&empty);

        let operation = node
            .get_config("operation")
            .and_then(Value::as_str)
            .unwrap_or("select")
            .to_string();
        let Some(query_template) = node.get_config("query").and_then(Value::as_str).map(str::to_string)
        else {
            return NodeOutcome::error("database node requires a query", started.elapsed().as_secs_f64());
        };
        let database_name = node
            .get_config("database")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let raw_params = node
            .get_config("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let query = placeholder::substitute_str(&query_template, input_map);
        let is_vector_query = looks_like_vector_query(&query);

        let mut resolved_params = Vec::new();
        for param in &raw_params {
            let resolved = match param.as_str() {
                Some(s) if s.starts_with('{') && s.ends_with('}') => {
                    let key = &s[1..s.len() - 1];
                    input_map.get(key).cloned().unwrap_or(Value::Null)
                }
                _ => param.clone(),
            };
            resolved_params.push(if is_vector_query { coerce_vector_param(&resolved) } else { resolved });
        }

        let db_path = config.dbs_root.join(format!("{database_name}.sqlite"));
        let vector_extension_path = config.vector_extension_path();

        let result = tokio::task::spawn_blocking(move || -> Result<Vec<Value>, EngineError> {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| EngineError::ExternalIo(format!("failed to open database: {e}")))?;

            if is_vector_query {
                load_vector_extension(&conn, &vector_extension_path)?;
            }

            let statements: Vec<&str> =
                query.split(';').map(str::trim).filter(|s| !s.is_empty()).collect();
            let sql_params: Vec<SqlValue> = resolved_params.iter().map(value_to_sql).collect();

            let mut cursor = 0;
            let mut results = Vec::new();
            for statement in statements {
                let param_count = statement.matches('?').count();
                let slice = &sql_params[cursor.min(sql_params.len())..];
                let this_statement_params: Vec<SqlValue> = slice.iter().take(param_count).cloned().collect();
                cursor += param_count;
                results.push(run_statement(&conn, statement, &this_statement_params, &operation)?);
            }
            Ok(results)
        })
        .await;

        match result {
            Ok(Ok(mut results)) => {
                let output = if results.len() == 1 {
                    results.remove(0)
                } else {
                    Value::Array(results)
                };
                NodeOutcome::success(output, started.elapsed().as_secs_f64())
            }
            Ok(Err(e)) => NodeOutcome::error(e.message(), started.elapsed().as_secs_f64()),
            Err(e) => NodeOutcome::error(
                format!("database task panicked: {e}"),
                started.elapsed().as_secs_f64(),
            ),
        }
    }
}
