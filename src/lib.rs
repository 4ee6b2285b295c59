//! Multi-dialect SQL query builder.
//!
//! Predicates, projections and orderings are written as [`ast::Node`] trees
//! and compiled into SQL for SQL Server, MySQL, Oracle, PostgreSQL or SQLite.
//! Compiled templates are cached per tree shape and rebound against the
//! values of each new tree, so repeated queries skip compilation.
//!
//! ```ignore
//! use polysql::{Dialect, Node, SqlEngine};
//!
//! let engine = SqlEngine::new(Dialect::PostgreSql);
//! let query = engine
//!     .query("Customer")
//!     .filter(Node::column("c", "Age").gt(18))?
//!     .to_sql();
//! assert_eq!(query.sql, "SELECT * FROM \"Customer\" c WHERE (c.\"Age\" > @Age_1)");
//! ```
pub mod ast;
pub mod config;
pub mod db;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod scan;
pub mod statement;

pub use ast::{DeclaredType, Node, Value};
pub use config::EngineConfig;
pub use db::{Executor, Row};
pub use dialect::{Dialect, DialectCatalog, DialectProfile};
pub use engine::SqlEngine;
pub use error::{CacheConsistencyError, CompileError, ConfigurationError, Error, Result};
pub use statement::{
    DeleteBuilder, Entity, FieldMetadata, InsertBuilder, JoinKind, OrderDirection, Pagination,
    QueryBuilder, Statement, UpdateBuilder,
};
