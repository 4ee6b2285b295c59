/// Error taxonomy for compilation, statement construction and plan rebinding.
///
/// Compile and configuration failures are always fatal and raised before any
/// SQL reaches an executor. Execution failures are carried through untouched.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure to render a node tree into SQL.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("function '{0}' is not registered for this dialect")]
    UnknownFunction(String),

    #[error("no conversion mapping for type '{0}'")]
    UnsupportedConversion(String),

    #[error("unsupported expression node: {0}")]
    UnsupportedNode(String),

    #[error("unsupported member access: {0}")]
    UnsupportedMember(String),

    #[error("captured value could not be resolved: {0}")]
    UnresolvedCapture(String),

    #[error("function '{function}' is missing argument {index}")]
    MissingArgument { function: String, index: usize },

    #[error("invalid argument for '{function}': {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("HAVING requires a preceding GROUP BY")]
    HavingWithoutGroupBy,
}

/// Builder misuse detected before any SQL is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("where column '{0}' was already specified")]
    DuplicateWhereColumn(String),

    #[error("parameter '{0}' is already bound")]
    DuplicateParameter(String),

    #[error("update of '{0}' needs a WHERE condition or a primary key column")]
    MissingUpdateCondition(String),

    #[error("update of '{table}' has {count} primary key columns; exactly one is required")]
    AmbiguousUpdateKey { table: String, count: usize },

    #[error("union requires at least two queries, got {0}")]
    EmptyUnion(usize),

    #[error("batch operation on '{0}' has no rows")]
    EmptyBatch(String),

    #[error("row {row} of '{table}' does not match the column layout of the first row")]
    RowShapeMismatch { table: String, row: usize },

    #[error("'{0}' has no primary key column to correlate on")]
    MissingPrimaryKey(String),

    #[error("batch update of '{0}' correlates on the primary key; filters are not supported")]
    UnsupportedBatchFilter(String),

    #[error("no columns left to write for '{0}'")]
    NoColumns(String),

    #[error("invalid pagination: page {page}, page size {page_size}")]
    InvalidPagination { page: u64, page_size: u64 },

    #[error("{feature} is not supported by {dialect}")]
    UnsupportedDialectFeature { feature: String, dialect: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A cached plan no longer lines up with the tree it is being rebound against.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheConsistencyError {
    #[error("value site {site} not present in expression tree")]
    MissingSite { site: usize },

    #[error("value site {site} cannot follow path step '{step}'")]
    BrokenPath { site: usize, step: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    CacheConsistency(#[from] CacheConsistencyError),

    /// Raised by the executor; passed through as-is.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl Error {
    pub fn is_compile(&self) -> bool {
        matches!(self, Error::Compile(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_names_function() {
        let err = CompileError::UnknownFunction("Soundex".to_string());
        assert!(err.to_string().contains("Soundex"));
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ConfigurationError::EmptyUnion(1).into();
        assert!(err.is_configuration());
        assert!(!err.is_compile());

        let err: Error = CompileError::HavingWithoutGroupBy.into();
        assert!(err.is_compile());
    }

    #[test]
    fn test_execution_error_passes_through() {
        let err: Error = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.to_string(), "connection reset");
    }
}
