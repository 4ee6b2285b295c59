use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Executor, Row};
use crate::dialect::Dialect;
use crate::statement::{ParameterBindings, Statement};

type AffectedFn = Box<dyn Fn(&str, &ParameterBindings) -> u64 + Send + Sync>;

#[derive(Debug, Default)]
struct Log {
    statements: Vec<Statement>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
}

/// In-memory executor that records every statement it is handed.
///
/// Useful for inspecting what a builder sends without a database. Queries
/// return the configured rows; statements report the configured affected
/// count (one by default).
pub struct RecordingExecutor {
    dialect: Dialect,
    rows: Vec<Row>,
    affected: AffectedFn,
    fail_on: Option<usize>,
    log: Mutex<Log>,
}

impl RecordingExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            rows: Vec::new(),
            affected: Box::new(|_, _| 1),
            fail_on: None,
            log: Mutex::new(Log::default()),
        }
    }

    /// Rows returned by every query.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_affected<F>(mut self, affected: F) -> Self
    where
        F: Fn(&str, &ParameterBindings) -> u64 + Send + Sync + 'static,
    {
        self.affected = Box::new(affected);
        self
    }

    /// Fails the `n`th statement (1-based, counting queries too).
    pub fn fail_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    /// `(begins, commits, rollbacks)` seen so far.
    pub fn transactions(&self) -> (usize, usize, usize) {
        let log = self.lock();
        (log.begins, log.commits, log.rollbacks)
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, sql: &str, params: &ParameterBindings) -> anyhow::Result<()> {
        let mut log = self.lock();
        log.statements.push(Statement::new(sql, params.clone()));
        let n = log.statements.len();
        if self.fail_on == Some(n) {
            anyhow::bail!("statement {} failed", n);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RecordingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingExecutor")
            .field("dialect", &self.dialect)
            .field("rows", &self.rows.len())
            .field("fail_on", &self.fail_on)
            .finish()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, sql: &str, params: &ParameterBindings) -> anyhow::Result<u64> {
        self.record(sql, params)?;
        Ok((self.affected)(sql, params))
    }

    async fn query(&self, sql: &str, params: &ParameterBindings) -> anyhow::Result<Vec<Row>> {
        self.record(sql, params)?;
        Ok(self.rows.clone())
    }

    async fn begin(&self) -> anyhow::Result<()> {
        self.lock().begins += 1;
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        self.lock().commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.lock().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;

    #[tokio::test]
    async fn test_records_in_order() {
        let executor = RecordingExecutor::new(Dialect::Sqlite);
        let mut params = ParameterBindings::new();
        params.insert("Id_1", Value::Int(1)).unwrap();
        executor.execute("DELETE FROM t WHERE Id = @Id_1", &params).await.unwrap();
        executor.query("SELECT 1", &ParameterBindings::new()).await.unwrap();

        let statements = executor.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].params.get("Id_1"), Some(&Value::Int(1)));
        assert_eq!(statements[1].sql, "SELECT 1");
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let executor = RecordingExecutor::new(Dialect::Sqlite).fail_on(1);
        assert!(executor.execute("SELECT 1", &ParameterBindings::new()).await.is_err());
        assert_eq!(executor.statements().len(), 1);
    }
}
