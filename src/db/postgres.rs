use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Client;
use tracing::debug;

use super::connection::{create_client, ConnectionConfig};
use super::{Executor, Row};
use crate::ast::Value;
use crate::dialect::Dialect;
use crate::scan;
use crate::statement::ParameterBindings;

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Coarse class of a PostgreSQL failure, from its SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    /// Missing table or column, ambiguous reference.
    Semantic,
    /// Division by zero, constraint violation.
    Execution,
    Transaction,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "syntax error"),
            ErrorCategory::Semantic => write!(f, "semantic error"),
            ErrorCategory::Execution => write!(f, "execution error"),
            ErrorCategory::Transaction => write!(f, "transaction error"),
            ErrorCategory::Connection => write!(f, "connection error"),
            ErrorCategory::Unknown => write!(f, "error"),
        }
    }
}

/// Executor over a single `tokio_postgres` client.
///
/// Named `@name` parameters are rewritten to positional `$n` ones. A text
/// holding several `;`-separated statements (a batch chunk) runs them one
/// by one. Transactions use plain `BEGIN`/`COMMIT`/`ROLLBACK`.
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let client = create_client(config).await?;
        debug!(server = %config.display_string(), "connected");
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn run(&self, sql: &str, params: &ParameterBindings) -> Result<u64> {
        let (sql, values) = to_positional(sql, params)?;
        let refs = param_refs(&values);
        self.client
            .execute(sql.as_str(), &refs)
            .await
            .map_err(|e| describe_error(e, &sql))
    }
}

impl fmt::Debug for PgExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgExecutor")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

#[async_trait]
impl Executor for PgExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn execute(&self, sql: &str, params: &ParameterBindings) -> Result<u64> {
        let mut total = 0;
        for statement in scan::split_statements(sql) {
            total += self.run(statement, params).await?;
        }
        Ok(total)
    }

    async fn query(&self, sql: &str, params: &ParameterBindings) -> Result<Vec<Row>> {
        let (sql, values) = to_positional(sql, params)?;
        let refs = param_refs(&values);
        let rows = self
            .client
            .query(sql.as_str(), &refs)
            .await
            .map_err(|e| describe_error(e, &sql))?;
        Ok(rows.iter().map(parse_row).collect())
    }

    async fn begin(&self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }
}

fn param_refs(values: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    values
        .iter()
        .map(|v| v.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// Rewrites `@name` references to `$n` and collects the values in position
/// order. Each distinct name gets one position; NULL is written inline since
/// it has no single wire type.
pub fn to_positional(sql: &str, params: &ParameterBindings) -> Result<(String, Vec<BoxedParam>)> {
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<BoxedParam> = Vec::new();
    let mut failure = None;

    let rewritten = scan::rewrite_parameters(sql, '@', scan::DOUBLE_QUOTE, |name| {
        let value = match params.get(name) {
            Some(value) => value,
            None => {
                failure.get_or_insert_with(|| anyhow::anyhow!("parameter '{}' is not bound", name));
                return None;
            }
        };
        let cast = match value {
            Value::Null => return Some("NULL".to_string()),
            Value::Int(_) => "::BIGINT",
            Value::Float(_) => "::DOUBLE PRECISION",
            Value::DateTime(_) => "::TIMESTAMP",
            _ => "",
        };
        let position = match names.iter().position(|n| n == name) {
            Some(i) => i + 1,
            None => match to_param(value) {
                Ok(param) => {
                    names.push(name.to_string());
                    values.push(param);
                    names.len()
                }
                Err(e) => {
                    failure.get_or_insert(e);
                    return None;
                }
            },
        };
        Some(format!("${}{}", position, cast))
    });

    match failure {
        Some(e) => Err(e),
        None => Ok((rewritten, values)),
    }
}

fn to_param(value: &Value) -> Result<BoxedParam> {
    Ok(match value {
        Value::Null => Box::new(None::<String>),
        Value::Bool(b) => Box::new(*b),
        Value::Int(i) => Box::new(*i),
        Value::Float(f) => Box::new(*f),
        Value::Text(s) => Box::new(s.clone()),
        Value::DateTime(dt) => Box::new(*dt),
        Value::List(_) | Value::Record(_) | Value::SubQuery(_) => {
            anyhow::bail!("{} value cannot be sent as a parameter", value.declared_type())
        }
    })
}

fn parse_row(row: &tokio_postgres::Row) -> Row {
    let cells = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), extract_value(row, i, col.type_())))
        .collect();
    Row::new(cells)
}

fn extract_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> Value {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        idx: usize,
    ) -> Option<T> {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    let value = match *pg_type {
        Type::BOOL => get::<bool>(row, idx).map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx).map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx).map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx).map(Value::Int),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx).map(Value::Float),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx).map(Value::DateTime),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx).map(|v| Value::DateTime(v.naive_utc())),
        Type::DATE => get::<NaiveDate>(row, idx)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Value::DateTime),
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx).map(|v| Value::Text(v.to_string()))
        }
        // Text types and anything else with a text representation
        _ => get::<String>(row, idx).map(Value::Text),
    };
    value.unwrap_or(Value::Null)
}

/// Wraps a driver error with its SQLSTATE class and the line and column it
/// points at in `sql`.
fn describe_error(err: tokio_postgres::Error, sql: &str) -> anyhow::Error {
    let context = match err.as_db_error() {
        Some(db) => {
            let code = db.code().code().to_string();
            let mut context = format!("{} [{}]: {}", categorize_sqlstate(&code), code, db.message());
            if let Some(tokio_postgres::error::ErrorPosition::Original(pos)) = db.position() {
                let (line, col) = byte_offset_to_line_col(sql, *pos as usize);
                context.push_str(&format!(" at line {}, column {}", line, col));
            }
            if let Some(hint) = db.hint() {
                context.push_str(&format!(" (hint: {})", hint));
            }
            context
        }
        None => format!("{}: {}", ErrorCategory::Connection, err),
    };
    anyhow::Error::new(err).context(context)
}

/// 1-based line and column of a 1-based byte offset.
fn byte_offset_to_line_col(query: &str, byte_pos: usize) -> (usize, usize) {
    if byte_pos == 0 || query.is_empty() {
        return (1, 1);
    }
    let target = (byte_pos - 1).min(query.len());
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in query.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

pub fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        // 42P01 undefined_table, 42703 undefined_column
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}
