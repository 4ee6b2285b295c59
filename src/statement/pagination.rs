use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::ConfigurationError;

/// A 1-based page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    /// Raw `ORDER BY` text for the window or outer query.
    #[serde(default)]
    pub order_by: Option<String>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            order_by: None,
        }
    }
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size,
            order_by: None,
        }
    }

    pub fn order_by(mut self, hint: impl Into<String>) -> Self {
        self.order_by = Some(hint.into());
        self
    }

    fn invalid(&self) -> ConfigurationError {
        ConfigurationError::InvalidPagination {
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Both numbers must be at least 1 and the last row number must fit in
    /// a `u64`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.row_range().map(|_| ())
    }

    /// Zero-based offset of the first row.
    pub fn offset(&self) -> Result<u64, ConfigurationError> {
        self.row_range().map(|(start, _)| start - 1)
    }

    /// 1-based row numbers of the first and last row on the page.
    pub fn row_range(&self) -> Result<(u64, u64), ConfigurationError> {
        if self.page < 1 || self.page_size < 1 {
            return Err(self.invalid());
        }
        let end = self
            .page
            .checked_mul(self.page_size)
            .ok_or_else(|| self.invalid())?;
        Ok((end - self.page_size + 1, end))
    }

    /// Wraps `sql` so it returns only this page.
    pub fn wrap(&self, dialect: Dialect, sql: &str) -> Result<String, ConfigurationError> {
        let (start, end) = self.row_range()?;
        let hint = self.order_by.as_deref();
        Ok(match dialect {
            Dialect::SqlServer => format!(
                "SELECT * FROM (SELECT ROW_NUMBER() OVER (ORDER BY {}) row_id, x.* FROM ({}) x) x WHERE x.row_id BETWEEN {} AND {}",
                hint.unwrap_or("(SELECT 0)"),
                sql,
                start,
                end
            ),
            Dialect::Oracle => format!(
                "SELECT * FROM (SELECT ROW_NUMBER() OVER (ORDER BY {}) \"row_id\", \"x\".* FROM ({}) \"x\") \"x\" WHERE \"x\".\"row_id\" BETWEEN {} AND {}",
                hint.unwrap_or("NULL"),
                sql,
                start,
                end
            ),
            Dialect::MySql | Dialect::PostgreSql | Dialect::Sqlite => {
                let order = hint.map(|h| format!(" ORDER BY {}", h)).unwrap_or_default();
                format!(
                    "SELECT * FROM ({}) x{} LIMIT {} OFFSET {}",
                    sql,
                    order,
                    self.page_size,
                    start - 1
                )
            }
        })
    }
}

/// One page of rows plus the total row count of the unpaged query.
#[derive(Debug, Clone, PartialEq)]
pub struct PageData<T> {
    pub rows: Vec<T>,
    pub total: u64,
}
