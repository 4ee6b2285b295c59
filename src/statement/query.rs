use tracing::trace;

use super::pagination::{PageData, Pagination};
use super::params::ParameterBindings;
use super::{JoinKind, OrderDirection, Statement};
use crate::ast::cache;
use crate::ast::{Node, ResolveMode, ResolveOptions, Value};
use crate::db::{Executor, Row};
use crate::dialect::Dialect;
use crate::engine::SqlEngine;
use crate::error::{CompileError, ConfigurationError, Result};

#[derive(Debug, Clone)]
enum Source {
    Table(String),
    /// Already rendered `a UNION b ...` body and the name it is selected as.
    Union { sql: String, name: String },
}

/// `SELECT` builder.
///
/// Columns are always written as `alias.column`. The base table is named by
/// the explicit [`alias`](Self::alias), or else by the first row alias the
/// query's expressions read that does not belong to a joined table, so the
/// order of `filter` and `join` calls does not change the output.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    engine: SqlEngine,
    source: Source,
    alias: Option<String>,
    /// Row aliases read by compiled expressions, in first-use order.
    referenced: Vec<String>,
    joined: Vec<String>,
    distinct: bool,
    columns: Option<String>,
    joins: Vec<String>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    insert_into: Option<(String, Vec<String>)>,
    params: ParameterBindings,
}

impl QueryBuilder {
    pub fn new(engine: SqlEngine, table: impl Into<String>) -> Self {
        Self::from_source(engine, Source::Table(table.into()), ParameterBindings::new())
    }

    fn from_source(engine: SqlEngine, source: Source, params: ParameterBindings) -> Self {
        Self {
            engine,
            source,
            alias: None,
            referenced: Vec::new(),
            joined: Vec::new(),
            distinct: false,
            columns: None,
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            insert_into: None,
            params,
        }
    }

    /// Combines two or more queries with `UNION` (or `UNION ALL`).
    ///
    /// Each query's parameters are renamed into the combined set, so queries
    /// built independently never clash.
    pub fn union(engine: SqlEngine, queries: Vec<QueryBuilder>, all: bool) -> Result<Self> {
        if queries.len() < 2 {
            return Err(ConfigurationError::EmptyUnion(queries.len()).into());
        }
        let mut params = ParameterBindings::new();
        let parts: Vec<String> = queries
            .iter()
            .map(|q| cache::splice(&q.to_sql(), engine.profile(), &mut params))
            .collect();
        let (separator, prefix) = if all {
            (" UNION ALL ", "UnionAll")
        } else {
            (" UNION ", "Union")
        };
        let source = Source::Union {
            sql: parts.join(separator),
            name: format!("{}_{}", prefix, queries.len()),
        };
        Ok(Self::from_source(engine, source, params))
    }

    fn compile(&mut self, node: &Node, mode: ResolveMode) -> Result<String> {
        let sql = self
            .engine
            .compile(node, ResolveOptions::new(mode), &mut self.params)?;
        for alias in node.row_aliases() {
            if !self.referenced.iter().any(|a| a == alias) {
                self.referenced.push(alias.to_string());
            }
        }
        Ok(sql)
    }

    /// Alias the base table is selected under, if any expression needs one.
    fn row_alias(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| {
            self.referenced
                .iter()
                .find(|a| !self.joined.contains(*a))
                .map(String::as_str)
        })
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Selected columns: a column, an expression or a [`Node::project`].
    pub fn select(mut self, projection: Node) -> Result<Self> {
        self.columns = Some(self.compile(&projection, ResolveMode::Select)?);
        Ok(self)
    }

    pub fn join(
        mut self,
        kind: JoinKind,
        table: &str,
        alias: &str,
        on: Node,
    ) -> Result<Self> {
        self.joined.push(alias.to_string());
        let condition = self.compile(&on, ResolveMode::Where)?;
        let table = self.engine.profile().quote(table);
        self.joins
            .push(format!("{} {} {} ON {}", kind.keyword(), table, alias, condition));
        Ok(self)
    }

    pub fn filter(mut self, predicate: Node) -> Result<Self> {
        let sql = self.compile(&predicate, ResolveMode::Where)?;
        self.wheres.push(sql);
        Ok(self)
    }

    pub fn in_list(self, column: Node, values: impl Into<Value>) -> Result<Self> {
        self.filter(column.in_list(Node::lit(values)))
    }

    pub fn not_in(self, column: Node, values: impl Into<Value>) -> Result<Self> {
        self.filter(column.not_in(Node::lit(values)))
    }

    /// Groups by `key`; the grouped columns also become the selection.
    pub fn group_by(mut self, key: Node) -> Result<Self> {
        let sql = self.compile(&key, ResolveMode::GroupBy)?;
        self.columns = Some(sql.clone());
        self.group_by.push(sql);
        Ok(self)
    }

    pub fn having(mut self, predicate: Node) -> Result<Self> {
        if self.group_by.is_empty() {
            return Err(CompileError::HavingWithoutGroupBy.into());
        }
        let sql = self.compile(&predicate, ResolveMode::Where)?;
        self.having.push(sql);
        Ok(self)
    }

    pub fn order_by(mut self, key: Node, direction: OrderDirection) -> Result<Self> {
        let sql = self.compile(&key, ResolveMode::OrderBy)?;
        self.order_by.push(format!("{} {}", sql, direction.keyword()));
        Ok(self)
    }

    /// Orders by raw SQL text, written as given.
    pub fn order_by_raw(mut self, fields: &str, direction: OrderDirection) -> Self {
        self.order_by
            .push(format!("{} {}", fields, direction.keyword()));
        self
    }

    /// Turns the query into `INSERT INTO table (columns) SELECT ...`.
    pub fn insert_into(mut self, table: &str, columns: &[&str]) -> Self {
        self.insert_into = Some((
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    pub fn params(&self) -> &ParameterBindings {
        &self.params
    }

    // ==================== Rendering ====================

    /// Renders the statement text. `window` is put in front of the selected
    /// columns; `ORDER BY` is left out unless `ordered`.
    fn render(&self, window: Option<&str>, ordered: bool) -> String {
        let profile = self.engine.profile();
        let mut parts: Vec<String> = Vec::new();

        if let Some((table, columns)) = &self.insert_into {
            let columns: Vec<String> = columns.iter().map(|c| profile.quote(c)).collect();
            parts.push(format!(
                "INSERT INTO {} ({})",
                profile.quote(table),
                columns.join(", ")
            ));
        }
        parts.push("SELECT".to_string());
        if self.distinct {
            parts.push("DISTINCT".to_string());
        }
        let columns = self.columns.as_deref().unwrap_or("*");
        match window {
            Some(window) => parts.push(format!("{}, {}", window, columns)),
            None => parts.push(columns.to_string()),
        }
        parts.push("FROM".to_string());
        let alias = self.row_alias();
        match &self.source {
            Source::Table(table) => {
                parts.push(profile.quote(table));
                parts.extend(alias.map(String::from));
            }
            Source::Union { sql, name } => parts.push(format!(
                "({}) {}",
                sql,
                alias.map_or_else(|| profile.quote(name), String::from)
            )),
        }
        parts.extend(self.joins.iter().cloned());
        if !self.wheres.is_empty() {
            parts.push(format!("WHERE {}", self.wheres.join(" AND ")));
        }
        if !self.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.having.is_empty() {
            parts.push(format!("HAVING {}", self.having.join(" AND ")));
        }
        if ordered && !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }

        let sql = parts.join(" ");
        trace!(sql = %sql, "rendered query");
        sql
    }

    pub fn to_sql(&self) -> Statement {
        Statement::new(self.render(None, true), self.params.clone())
    }

    /// `SELECT COUNT(1) AS Qty FROM (<query>) x`, without the query's ordering.
    pub fn to_count_sql(&self) -> Statement {
        Statement::new(
            format!("SELECT COUNT(1) AS Qty FROM ({}) x", self.render(None, false)),
            self.params.clone(),
        )
    }

    pub fn to_page_sql(&self, pagination: &Pagination) -> Result<Statement> {
        let sql = match self.engine.dialect() {
            Dialect::SqlServer => self.row_number_page(pagination)?,
            dialect => pagination.wrap(dialect, &self.render(None, true))?,
        };
        Ok(Statement::new(sql, self.params.clone()))
    }

    /// SQL Server rejects `ORDER BY` in a derived table, so the ordering goes
    /// into a `ROW_NUMBER()` window on the query itself.
    fn row_number_page(&self, pagination: &Pagination) -> Result<String> {
        let (start, end) = pagination.row_range()?;
        let order_without_hint = pagination.order_by.is_none() && !self.order_by.is_empty();
        if self.distinct {
            // A row number per row would defeat DISTINCT; number the rows outside.
            if order_without_hint {
                return Err(ConfigurationError::UnsupportedDialectFeature {
                    feature: "paging an ordered DISTINCT query without an order hint".to_string(),
                    dialect: Dialect::SqlServer.to_string(),
                }
                .into());
            }
            return Ok(pagination.wrap(Dialect::SqlServer, &self.render(None, false))?);
        }
        let order = match &pagination.order_by {
            Some(hint) => hint.clone(),
            None if order_without_hint => self.order_by.join(", "),
            None => "(SELECT 0)".to_string(),
        };
        let window = format!("ROW_NUMBER() OVER (ORDER BY {}) row_id", order);
        Ok(format!(
            "SELECT * FROM ({}) x WHERE x.row_id BETWEEN {} AND {}",
            self.render(Some(&window), false),
            start,
            end
        ))
    }

    // ==================== Execution ====================

    pub async fn to_list(&self, executor: &dyn Executor) -> Result<Vec<Row>> {
        let statement = self.to_sql();
        Ok(executor.query(&statement.sql, &statement.params).await?)
    }

    pub async fn first(&self, executor: &dyn Executor) -> Result<Option<Row>> {
        let statement = self.to_page_sql(&Pagination::new(1, 1))?;
        let rows = executor.query(&statement.sql, &statement.params).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn count(&self, executor: &dyn Executor) -> Result<u64> {
        let statement = self.to_count_sql();
        let rows = executor.query(&statement.sql, &statement.params).await?;
        let qty = rows
            .first()
            .and_then(|row| row.values().next())
            .cloned()
            .unwrap_or(Value::Null);
        match qty {
            Value::Int(n) if n >= 0 => Ok(n as u64),
            other => Err(anyhow::anyhow!("COUNT query returned {:?}", other).into()),
        }
    }

    pub async fn any(&self, executor: &dyn Executor) -> Result<bool> {
        Ok(self.count(executor).await? > 0)
    }

    pub async fn to_page(
        &self,
        executor: &dyn Executor,
        pagination: &Pagination,
    ) -> Result<PageData<Row>> {
        let statement = self.to_page_sql(pagination)?;
        let rows = executor.query(&statement.sql, &statement.params).await?;
        let total = self.count(executor).await?;
        Ok(PageData { rows, total })
    }

    /// Runs the query as `INSERT INTO table (columns) SELECT ...`.
    pub async fn execute_insert(
        self,
        executor: &dyn Executor,
        table: &str,
        columns: &[&str],
    ) -> Result<u64> {
        let statement = self.insert_into(table, columns).to_sql();
        Ok(executor.execute(&statement.sql, &statement.params).await?)
    }
}
