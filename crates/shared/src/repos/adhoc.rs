use std::collections::HashMap;

use serde_json::{Map, Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::warn;

use super::{Store, StoreError};

/// Bind values for an ad-hoc statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlParameters {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl SqlParameters {
    pub fn from_json(value: Option<&Value>) -> Result<Self, StoreError> {
        match value {
            None | Some(Value::Null) => Ok(Self::None),
            Some(Value::Array(values)) => Ok(Self::Positional(values.clone())),
            Some(Value::Object(values)) => Ok(Self::Named(values.clone())),
            Some(other) => Err(StoreError::InvalidParameters(format!(
                "expected an array or object, got {other}"
            ))),
        }
    }
}

impl Store {
    /// Runs a statement on a connection switched to `query_only` and returns
    /// rows keyed by the statement's own column names.
    ///
    /// Callers are expected to have screened `sql` already; the pragma only
    /// stops writes that slip through. If this future is dropped mid-query the
    /// pool's release hook restores the connection.
    pub async fn execute_read_only(
        &self,
        sql: &str,
        parameters: &SqlParameters,
    ) -> Result<Vec<Map<String, Value>>, StoreError> {
        let (statement, values) = match parameters {
            SqlParameters::None => (sql.to_string(), Vec::new()),
            SqlParameters::Positional(values) => (sql.to_string(), values.clone()),
            SqlParameters::Named(values) => bind_named_parameters(sql, values),
        };

        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await?;

        let mut query = sqlx::query(&statement);
        for value in &values {
            query = bind_json_value(query, value);
        }
        let result = query.fetch_all(&mut *conn).await;

        if let Err(err) = sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut *conn)
            .await
        {
            warn!(error = %err, "failed to restore writable connection; discarding it");
            drop(conn.detach());
        }

        let rows = result?;
        rows.iter().map(row_to_json).collect()
    }
}

/// Rewrites `:name`, `@name` and `$name` placeholders outside string literals
/// to `?N`, numbering names by first appearance. Names missing from `values`
/// bind NULL. `$1`-style positional placeholders are left untouched.
pub fn bind_named_parameters(sql: &str, values: &Map<String, Value>) -> (String, Vec<Value>) {
    let mut rewritten = String::with_capacity(sql.len());
    let mut order: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            rewritten.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                rewritten.push(ch);
            }
            ':' | '@' | '$'
                if chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
            {
                let mut name = String::new();
                while let Some(next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        name.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }

                let position = match positions.get(&name) {
                    Some(position) => *position,
                    None => {
                        order.push(name.clone());
                        positions.insert(name, order.len());
                        order.len()
                    }
                };
                rewritten.push('?');
                rewritten.push_str(&position.to_string());
            }
            _ => rewritten.push(ch),
        }
    }

    let bound = order
        .iter()
        .map(|name| values.get(name).cloned().unwrap_or(Value::Null))
        .collect();

    (rewritten, bound)
}

fn bind_json_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64()),
        },
        Value::String(text) => query.bind(text.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> Result<Map<String, Value>, StoreError> {
    let mut object = Map::new();

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" | "NUMERIC" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}
