use std::collections::HashSet;

use tracing::{trace, warn};

use super::entity::Entity;
use super::params::ParameterBindings;
use super::Statement;
use crate::ast::{Node, ResolveOptions, Value};
use crate::db::Executor;
use crate::engine::SqlEngine;
use crate::error::{ConfigurationError, Result};

/// `DELETE` builder. Conditions are ANDed together.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    engine: SqlEngine,
    table: String,
    wheres: Vec<String>,
    where_columns: HashSet<String>,
    params: ParameterBindings,
}

impl DeleteBuilder {
    pub fn new(engine: SqlEngine, table: impl Into<String>) -> Self {
        Self {
            engine,
            table: table.into(),
            wheres: Vec::new(),
            where_columns: HashSet::new(),
            params: ParameterBindings::new(),
        }
    }

    pub fn filter(mut self, predicate: Node) -> Result<Self> {
        let options = ResolveOptions::where_clause().without_alias();
        let sql = self.engine.compile(&predicate, options, &mut self.params)?;
        self.wheres.push(sql);
        Ok(self)
    }

    /// Adds `column = value`. Each column may be named once.
    pub fn where_column(mut self, column: &str, value: impl Into<Value>) -> Result<Self> {
        if !self.where_columns.insert(column.to_string()) {
            return Err(ConfigurationError::DuplicateWhereColumn(column.to_string()).into());
        }
        let profile = self.engine.profile();
        let name = self.params.bind_fresh(column, value.into());
        self.wheres.push(format!(
            "{} = {}",
            profile.quote(column),
            profile.placeholder(&name)
        ));
        Ok(self)
    }

    pub fn where_columns<I, V>(self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .try_fold(self, |builder, (column, value)| builder.where_column(column, value))
    }

    /// Deletes the row identified by `entity`'s primary key columns.
    pub fn for_entity<T: Entity>(self, entity: &T) -> Result<Self> {
        let keys: Vec<_> = entity
            .fields()
            .into_iter()
            .filter(|f| f.is_primary_key && !f.not_mapped)
            .collect();
        if keys.is_empty() {
            return Err(ConfigurationError::MissingPrimaryKey(self.table.clone()).into());
        }
        keys.into_iter().try_fold(self, |builder, field| {
            builder.where_column(&field.column, field.value)
        })
    }

    pub fn to_sql(&self) -> Statement {
        let table = self.engine.profile().quote(&self.table);
        let sql = if self.wheres.is_empty() {
            warn!(table = %self.table, "delete without WHERE removes every row");
            format!("DELETE FROM {}", table)
        } else {
            format!("DELETE FROM {} WHERE {}", table, self.wheres.join(" AND "))
        };
        trace!(sql = %sql, "rendered delete");
        Statement::new(sql, self.params.clone())
    }

    pub async fn execute(self, executor: &dyn Executor) -> Result<u64> {
        let statement = self.to_sql();
        Ok(executor.execute(&statement.sql, &statement.params).await?)
    }
}
