/// Execution boundary.
///
/// Builders hand finished SQL and named bindings to an [`Executor`]; the
/// executor owns the connection, runs the statement and returns affected
/// row counts or rows. Driver errors are passed back untouched.
pub mod connection;
pub mod postgres;
pub mod recording;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ast::Value;
use crate::dialect::Dialect;
use crate::statement::{ParameterBindings, Statement};

pub use connection::{create_client, ConnectionConfig, SslMode};
pub use postgres::PgExecutor;
pub use recording::RecordingExecutor;

/// Runs SQL against one database.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Dialect the SQL handed to this executor is written in.
    fn dialect(&self) -> Dialect;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &ParameterBindings) -> anyhow::Result<u64>;

    async fn query(&self, sql: &str, params: &ParameterBindings) -> anyhow::Result<Vec<Row>>;

    async fn begin(&self) -> anyhow::Result<()>;

    async fn commit(&self) -> anyhow::Result<()>;

    async fn rollback(&self) -> anyhow::Result<()>;
}

/// One result row: column names with their values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(cells: Vec<(String, Value)>) -> Self {
        let (columns, values) = cells.into_iter().unzip();
        Self { columns, values }
    }

    /// Value of the first column named `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Runs `statements` in order inside one transaction and sums affected rows.
///
/// On the first failure the transaction is rolled back and that failure is
/// returned; a failed rollback is logged, not reported.
pub async fn run_in_transaction(
    executor: &dyn Executor,
    statements: &[Statement],
) -> anyhow::Result<u64> {
    executor.begin().await?;
    let mut total = 0;
    for (i, statement) in statements.iter().enumerate() {
        match executor.execute(&statement.sql, &statement.params).await {
            Ok(affected) => {
                debug!(chunk = i + 1, affected, "statement executed");
                total += affected;
            }
            Err(e) => {
                warn!(chunk = i + 1, error = %e, "statement failed, rolling back");
                if let Err(rollback) = executor.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }
    }
    executor.commit().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements(n: usize) -> Vec<Statement> {
        (0..n)
            .map(|i| Statement::new(format!("DELETE FROM t WHERE id = {}", i), Default::default()))
            .collect()
    }

    #[test]
    fn test_row_lookup() {
        let row = Row::new(vec![
            ("Id".to_string(), Value::Int(3)),
            ("Name".to_string(), Value::from("Ada")),
        ]);
        assert_eq!(row.get("id"), Some(&Value::Int(3)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.columns(), ["Id".to_string(), "Name".to_string()]);
        assert_eq!(row.len(), 2);
    }

    #[tokio::test]
    async fn test_transaction_commits_and_sums() {
        let executor = RecordingExecutor::new(Dialect::MySql).with_affected(|_, _| 2);
        let total = run_in_transaction(&executor, &statements(3)).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(executor.transactions(), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_and_keeps_error() {
        let executor = RecordingExecutor::new(Dialect::MySql).fail_on(2);
        let err = run_in_transaction(&executor, &statements(3)).await.unwrap_err();
        assert!(err.to_string().contains("statement 2"));
        assert_eq!(executor.statements().len(), 2);
        assert_eq!(executor.transactions(), (1, 0, 1));
    }
}
