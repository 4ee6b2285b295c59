/// Statement builders.
///
/// Each builder collects compiled fragments and bindings through fluent calls
/// and renders one finished [`Statement`] (or a list of chunk statements for
/// bulk operations). Builders are consumed by their terminal call.
pub mod batch;
pub mod delete;
pub mod entity;
pub mod insert;
pub mod pagination;
pub mod params;
pub mod query;
pub mod update;

use std::fmt;

pub use batch::chunk_rows;
pub use delete::DeleteBuilder;
pub use entity::{Entity, EntityMapping, FieldBinding, FieldMetadata};
pub use insert::InsertBuilder;
pub use pagination::{PageData, Pagination};
pub use params::ParameterBindings;
pub use query::QueryBuilder;
pub use update::UpdateBuilder;

/// Finished SQL plus its bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: ParameterBindings,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: ParameterBindings) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}
