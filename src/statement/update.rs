use tracing::trace;

use super::batch;
use super::entity::{EntityMapping, FieldBinding};
use super::Statement;
use crate::ast::{Node, ResolveOptions};
use crate::db::Executor;
use crate::engine::SqlEngine;
use crate::error::{ConfigurationError, Result};

/// `UPDATE` builder.
///
/// Rows are correlated on their single key column unless a filter is given.
/// A statement with neither is rejected before any SQL is rendered, so an
/// update can never silently touch the whole table.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    engine: SqlEngine,
    table: String,
    rows: Vec<EntityMapping>,
    batch: bool,
    wheres: Vec<String>,
}

impl UpdateBuilder {
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
            wheres: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Updates only the named columns. Key columns are kept for correlation.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        for row in &mut self.rows {
            row.keep_columns(columns, true);
        }
        self
    }

    pub fn ignore_columns(mut self, columns: &[&str]) -> Self {
        for row in &mut self.rows {
            row.ignore_columns(columns);
        }
        self
    }

    /// Correlates on `column` instead of the declared primary key.
    pub fn where_column(self, column: &str) -> Self {
        self.where_columns(&[column])
    }

    pub fn where_columns(mut self, columns: &[&str]) -> Self {
        for row in &mut self.rows {
            row.set_key_columns(columns);
        }
        self
    }

    /// Adds a WHERE predicate. Columns render without a table alias.
    pub fn filter(mut self, predicate: Node) -> Result<Self> {
        if self.batch {
            return Err(ConfigurationError::UnsupportedBatchFilter(self.table.clone()).into());
        }
        let options = ResolveOptions::where_clause().without_alias();
        let row = self
            .rows
            .first_mut()
            .ok_or_else(|| ConfigurationError::EmptyBatch(self.table.clone()))?;
        let sql = self.engine.compile(&predicate, options, &mut row.params)?;
        self.wheres.push(sql);
        Ok(self)
    }

    fn assignments(&self, row: &EntityMapping) -> String {
        let profile = self.engine.profile();
        row.fields
            .iter()
            .filter(|f| !f.is_primary_key)
            .map(|f| format!("{} = {}", profile.quote(&f.column), profile.placeholder(&f.identity)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_condition(&self, key: &FieldBinding) -> String {
        let profile = self.engine.profile();
        format!("{} = {}", profile.quote(&key.column), profile.placeholder(&key.identity))
    }

    /// Returns the single key column rows are correlated on.
    fn correlation_key<'a>(&self, row: &'a EntityMapping) -> Result<&'a FieldBinding> {
        let keys: Vec<&FieldBinding> = row.primary_keys().collect();
        match keys.as_slice() {
            [key] => Ok(*key),
            [] => Err(ConfigurationError::MissingUpdateCondition(self.table.clone()).into()),
            _ => Err(ConfigurationError::AmbiguousUpdateKey {
                table: self.table.clone(),
                count: keys.len(),
            }
            .into()),
        }
    }

    fn validate(&self) -> Result<()> {
        batch::check_layout(&self.table, &self.rows)?;
        let first = &self.rows[0];
        if first.fields.iter().all(|f| f.is_primary_key) {
            return Err(ConfigurationError::NoColumns(self.table.clone()).into());
        }
        if self.wheres.is_empty() {
            self.correlation_key(first)?;
        }
        Ok(())
    }

    fn render_row(&self, row: &EntityMapping) -> Result<String> {
        let profile = self.engine.profile();
        let condition = if self.wheres.is_empty() {
            self.key_condition(self.correlation_key(row)?)
        } else {
            self.wheres.join(" AND ")
        };
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            profile.quote(&self.table),
            self.assignments(row),
            condition
        ))
    }

    /// Renders the update. A batch renders one statement per row, grouped
    /// into chunks that respect the parameter budget.
    pub fn to_statements(&self) -> Result<Vec<Statement>> {
        self.validate()?;

        // With a filter the key is neither assigned nor compared, so its
        // binding would be dangling.
        let mut rows = self.rows.clone();
        if !self.wheres.is_empty() {
            for row in &mut rows {
                row.retain(|f| !f.is_primary_key);
            }
        }

        let budget = self.engine.config().parameter_budget;
        let chunks = batch::render_chunks(&rows, budget, |chunk| {
            let statements = chunk
                .iter()
                .map(|row| self.render_row(row))
                .collect::<Result<Vec<_>>>()?;
            Ok(statements.join(";\n"))
        })?;
        for chunk in &chunks {
            trace!(sql = %chunk.sql, "rendered update");
        }
        Ok(chunks)
    }

    pub fn to_sql(&self) -> Result<Statement> {
        batch::combine(&self.to_statements()?)
    }

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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Node, Value};
    use crate::db::recording::RecordingExecutor;
    use crate::dialect::Dialect;
    use crate::error::Error;
    use crate::statement::entity::test_support::{AuditLine, Product};
    use crate::statement::FieldMetadata;

    fn engine() -> SqlEngine {
        SqlEngine::new(Dialect::MySql)
    }

    fn configuration_error(err: Error) -> ConfigurationError {
        match err {
            Error::Configuration(e) => e,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_update_by_primary_key() {
        let statement = engine()
            .update(&Product::new(5, "Chair"))
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE `Product` SET `ProductName` = @ProductName_1 WHERE `ProductId` = @ProductId_1"
        );
        assert_eq!(statement.params.get("ProductId_1"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_update_raw_fields_by_key() {
        let statement = engine()
            .update_fields(
                "Product",
                vec![
                    FieldMetadata::key("ProductId", 5),
                    FieldMetadata::new("ProductName", "Chair"),
                ],
            )
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE `Product` SET `ProductName` = @ProductName_1 WHERE `ProductId` = @ProductId_1"
        );
        assert_eq!(statement.params.get("ProductId_1"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_update_raw_field_rows_by_named_column() {
        let rows = vec![
            [("Code", "A1"), ("Label", "first")],
            [("Code", "B2"), ("Label", "second")],
        ];
        let statement = engine()
            .update_fields_batch("Tag", rows)
            .unwrap()
            .where_column("Code")
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE `Tag` SET `Label` = @Label_1 WHERE `Code` = @Code_1;\n\
             UPDATE `Tag` SET `Label` = @Label_2 WHERE `Code` = @Code_2"
        );
        assert_eq!(statement.params.get("Code_2"), Some(&Value::from("B2")));
    }

    #[test]
    fn test_update_with_filter_drops_key_binding() {
        let statement = engine()
            .update(&Product::new(5, "Chair"))
            .unwrap()
            .filter(Node::column("p", "ProductName").eq(Node::lit("Stool")))
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE `Product` SET `ProductName` = @ProductName_1 WHERE (`ProductName` = @ProductName_2)"
        );
        assert!(!statement.params.contains("ProductId_1"));
        assert_eq!(statement.params.get("ProductName_2"), Some(&Value::from("Stool")));
    }

    #[test]
    fn test_where_column_moves_correlation() {
        let statement = engine()
            .update(&Product::new(5, "Chair"))
            .unwrap()
            .where_column("ProductName")
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE `Product` SET `ProductId` = @ProductId_1 WHERE `ProductName` = @ProductName_1"
        );
    }

    #[test]
    fn test_update_without_condition_is_rejected() {
        let line = AuditLine {
            message: "boot".into(),
            level: 1,
        };
        let err = engine().update(&line).unwrap().to_sql().unwrap_err();
        assert_eq!(
            configuration_error(err),
            ConfigurationError::MissingUpdateCondition("AuditLine".into())
        );
    }

    #[test]
    fn test_two_key_columns_are_ambiguous() {
        let err = engine()
            .update(&Product::new(5, "Chair"))
            .unwrap()
            .where_columns(&["ProductId", "ProductName"])
            .to_sql()
            .unwrap_err();
        assert_eq!(
            configuration_error(err),
            ConfigurationError::AmbiguousUpdateKey {
                table: "Product".into(),
                count: 2
            }
        );
    }

    #[test]
    fn test_only_key_columns_left() {
        let err = engine()
            .update(&Product::new(5, "Chair"))
            .unwrap()
            .columns(&["Missing"])
            .to_sql()
            .unwrap_err();
        assert_eq!(
            configuration_error(err),
            ConfigurationError::NoColumns("Product".into())
        );
    }

    #[test]
    fn test_batch_update_correlates_each_row() {
        let rows = vec![Product::new(1, "A"), Product::new(2, "B")];
        let statement = SqlEngine::new(Dialect::PostgreSql)
            .update_batch(&rows)
            .unwrap()
            .to_sql()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE \"Product\" SET \"ProductName\" = @ProductName_1 WHERE \"ProductId\" = @ProductId_1;\n\
             UPDATE \"Product\" SET \"ProductName\" = @ProductName_2 WHERE \"ProductId\" = @ProductId_2"
        );
        assert_eq!(statement.params.len(), 4);
    }

    #[test]
    fn test_batch_update_rejects_filter() {
        let err = engine()
            .update_batch(&[Product::new(1, "A")])
            .unwrap()
            .filter(Node::column("p", "ProductId").gt(Node::lit(0)))
            .unwrap_err();
        assert_eq!(
            configuration_error(err),
            ConfigurationError::UnsupportedBatchFilter("Product".into())
        );
    }

    #[tokio::test]
    async fn test_rejected_update_sends_nothing() {
        let executor = RecordingExecutor::new(Dialect::MySql);
        let line = AuditLine {
            message: "boot".into(),
            level: 1,
        };
        let result = engine().update(&line).unwrap().execute(&executor).await;
        assert!(result.is_err());
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn test_batch_update_runs_in_transaction() {
        let rows: Vec<Product> = (1..=3).map(|i| Product::new(i, "x")).collect();
        let executor = RecordingExecutor::new(Dialect::MySql);
        let affected = engine()
            .update_batch(&rows)
            .unwrap()
            .execute(&executor)
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(executor.statements().len(), 1);
        assert_eq!(executor.transactions(), (1, 1, 0));
    }
}
