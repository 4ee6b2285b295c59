use tracing::trace;

use super::batch;
use super::entity::EntityMapping;
use super::Statement;
use crate::ast::Value;
use crate::db::Executor;
use crate::dialect::Dialect;
use crate::engine::SqlEngine;
use crate::error::{ConfigurationError, Result};

/// `INSERT` builder for one row or a batch of rows.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    engine: SqlEngine,
    table: String,
    rows: Vec<EntityMapping>,
    batch: bool,
}

impl InsertBuilder {
    pub fn new(
        engine: SqlEngine,
        table: impl Into<String>,
        rows: Vec<EntityMapping>,
        batch: bool,
    ) -> Self {
        Self {
            engine,
            table: table.into(),
            rows,
            batch,
        }
    }

    /// Writes into `table` instead of the entity's own table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Inserts only the named columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        for row in &mut self.rows {
            row.keep_columns(columns, false);
        }
        self
    }

    pub fn ignore_columns(mut self, columns: &[&str]) -> Self {
        for row in &mut self.rows {
            row.ignore_columns(columns);
        }
        self
    }

    pub fn is_batch(&self) -> bool {
        self.batch
    }

    fn header(&self, row: &EntityMapping) -> String {
        let profile = self.engine.profile();
        let columns: Vec<String> = row.columns().map(|c| profile.quote(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES",
            profile.quote(&self.table),
            columns.join(", ")
        )
    }

    fn values(&self, row: &EntityMapping) -> String {
        let profile = self.engine.profile();
        let params: Vec<String> = row
            .fields
            .iter()
            .map(|f| profile.placeholder(&f.identity))
            .collect();
        format!("({})", params.join(", "))
    }

    /// One statement per chunk; a single row renders one chunk.
    ///
    /// Chunks hold as many rows as fit in the configured parameter budget.
    pub fn to_statements(&self) -> Result<Vec<Statement>> {
        batch::check_layout(&self.table, &self.rows)?;
        let budget = self.engine.config().parameter_budget;
        let chunks = batch::render_chunks(&self.rows, budget, |chunk| {
            let values: Vec<String> = chunk.iter().map(|row| self.values(row)).collect();
            Ok(format!("{} {}", self.header(&chunk[0]), values.join(", ")))
        })?;
        for chunk in &chunks {
            trace!(sql = %chunk.sql, "rendered insert");
        }
        Ok(chunks)
    }

    /// All chunks as one statement, joined with `;`.
    pub fn to_sql(&self) -> Result<Statement> {
        batch::combine(&self.to_statements()?)
    }

    /// Executes the insert and returns the affected row count. Batches run
    /// chunk by chunk inside one transaction.
    pub async fn execute(self, executor: &dyn Executor) -> Result<u64> {
        let chunks = self.to_statements()?;
        if self.batch {
            return batch::execute_chunks(executor, &self.table, &chunks).await;
        }
        let mut total = 0;
        for chunk in &chunks {
            total += executor.execute(&chunk.sql, &chunk.params).await?;
        }
        Ok(total)
    }

    /// Inserts one row and reads back the generated identity.
    pub async fn execute_returning_identity(self, executor: &dyn Executor) -> Result<Value> {
        let dialect = self.engine.dialect();
        let identity_sql = match dialect {
            Dialect::SqlServer | Dialect::MySql => "SELECT @@IDENTITY",
            Dialect::Sqlite => "SELECT LAST_INSERT_ROWID()",
            Dialect::Oracle | Dialect::PostgreSql => {
                return Err(ConfigurationError::UnsupportedDialectFeature {
                    feature: "identity readback".to_string(),
                    dialect: dialect.to_string(),
                }
                .into())
            }
        };
        if self.batch {
            return Err(ConfigurationError::UnsupportedDialectFeature {
                feature: "identity readback for batch inserts".to_string(),
                dialect: dialect.to_string(),
            }
            .into());
        }
        let statement = self.to_sql()?;
        executor.execute(&statement.sql, &statement.params).await?;
        let rows = executor
            .query(identity_sql, &Default::default())
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::recording::RecordingExecutor;
    use crate::error::Error;
    use crate::statement::entity::test_support::Product;

    fn products(n: usize) -> Vec<Product> {
        (0..n)
            .map(|i| Product::new(i as i64 + 1, &format!("item {}", i)))
            .collect()
    }

    #[test]
    fn test_single_row() {
        let statement = SqlEngine::new(Dialect::MySql)
            .insert(&Product::new(1, "Lamp"))
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO `Product` (`ProductId`, `ProductName`) VALUES (@ProductId_1, @ProductName_1)"
        );
        assert_eq!(statement.params.get("ProductName_1"), Some(&Value::from("Lamp")));
    }

    #[test]
    fn test_insert_raw_fields_into_named_table() {
        let statement = SqlEngine::new(Dialect::MySql)
            .insert_fields("Product", [("ProductName", "Lamp"), ("Colour", "red")])
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO `Product` (`ProductName`, `Colour`) VALUES (@ProductName_1, @Colour_1)"
        );
        assert_eq!(statement.params.get("Colour_1"), Some(&Value::from("red")));
    }

    #[test]
    fn test_insert_raw_field_rows_as_batch() {
        let rows = vec![
            vec![("ProductId", Value::Int(1)), ("ProductName", Value::from("A"))],
            vec![("ProductId", Value::Int(2)), ("ProductName", Value::from("B"))],
        ];
        let statement = SqlEngine::new(Dialect::SqlServer)
            .insert_fields_batch("Product", rows)
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO [Product] ([ProductId], [ProductName]) VALUES \
             (@ProductId_1, @ProductName_1), (@ProductId_2, @ProductName_2)"
        );
        assert_eq!(statement.params.get("ProductName_2"), Some(&Value::from("B")));
    }

    #[test]
    fn test_ignore_columns_drops_parameter() {
        let statement = SqlEngine::new(Dialect::Oracle)
            .insert(&Product::new(1, "Lamp"))
            .unwrap()
            .ignore_columns(&["ProductId"])
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"Product\" (\"ProductName\") VALUES (:ProductName_1)"
        );
        assert_eq!(statement.params.len(), 1);
    }

    #[test]
    fn test_no_columns_left() {
        let err = SqlEngine::new(Dialect::MySql)
            .insert(&Product::new(1, "Lamp"))
            .unwrap()
            .columns(&["Missing"])
            .to_sql()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::NoColumns(_))
        ));
    }

    #[test]
    fn test_batch_rows_share_statement() {
        let statement = SqlEngine::new(Dialect::SqlServer)
            .insert_batch(&products(2))
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO [Product] ([ProductId], [ProductName]) VALUES \
             (@ProductId_1, @ProductName_1), (@ProductId_2, @ProductName_2)"
        );
        assert_eq!(statement.params.len(), 4);
    }

    #[test]
    fn test_batch_chunking_under_budget() {
        let builder = SqlEngine::new(Dialect::MySql)
            .insert_batch(&products(2100))
            .unwrap();
        let chunks = builder.to_statements().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].params.len(), 2000);
        assert_eq!(chunks[2].params.len(), 200);
        assert!(chunks[2].sql.ends_with("(@ProductId_2100, @ProductName_2100)"));
    }

    #[test]
    fn test_empty_batch() {
        let err = SqlEngine::new(Dialect::MySql)
            .insert_batch::<Product>(&[])
            .unwrap()
            .to_statements()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::EmptyBatch(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_affected_rows_sum_across_chunks() {
        // Every chunk reports one affected row per inserted row.
        let executor = RecordingExecutor::new(Dialect::MySql)
            .with_affected(|_, params| params.len() as u64 / 2);
        let total = SqlEngine::new(Dialect::MySql)
            .insert_batch(&products(2100))
            .unwrap()
            .execute(&executor)
            .await
            .unwrap();
        assert_eq!(total, 2100);
        assert_eq!(executor.statements().len(), 3);
        assert_eq!(executor.transactions(), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_failed_chunk_rolls_back() {
        let executor = RecordingExecutor::new(Dialect::MySql).fail_on(2);
        let err = SqlEngine::new(Dialect::MySql)
            .insert_batch(&products(2100))
            .unwrap()
            .execute(&executor)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
        assert_eq!(executor.statements().len(), 2);
        assert_eq!(executor.transactions(), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_identity_readback() {
        let executor = RecordingExecutor::new(Dialect::Sqlite).with_rows(vec![
            crate::db::Row::new(vec![("id".to_string(), Value::Int(42))]),
        ]);
        let id = SqlEngine::new(Dialect::Sqlite)
            .insert(&Product::new(1, "Lamp"))
            .unwrap()
            .execute_returning_identity(&executor)
            .await
            .unwrap();
        assert_eq!(id, Value::Int(42));
        assert_eq!(executor.statements()[1].sql, "SELECT LAST_INSERT_ROWID()");

        let err = SqlEngine::new(Dialect::PostgreSql)
            .insert(&Product::new(1, "Lamp"))
            .unwrap()
            .execute_returning_identity(&executor)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::UnsupportedDialectFeature { .. })
        ));
    }
}
