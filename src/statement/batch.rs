use tracing::info;

use super::entity::EntityMapping;
use super::params::ParameterBindings;
use super::Statement;
use crate::db::{run_in_transaction, Executor};
use crate::error::{ConfigurationError, Result};

/// Rows per chunk so that `rows * columns` stays within `budget` parameters.
/// A row wider than the budget still gets a chunk of its own.
pub fn chunk_rows(budget: usize, columns: usize) -> usize {
    (budget / columns.max(1)).max(1)
}

/// Checks that every row has the first row's column layout.
pub(crate) fn check_layout(table: &str, rows: &[EntityMapping]) -> Result<()> {
    let first = rows
        .first()
        .ok_or_else(|| ConfigurationError::EmptyBatch(table.to_string()))?;
    if first.fields.is_empty() {
        return Err(ConfigurationError::NoColumns(table.to_string()).into());
    }
    if let Some(row) = rows.iter().position(|r| !r.same_layout(first)) {
        return Err(ConfigurationError::RowShapeMismatch {
            table: table.to_string(),
            row,
        }
        .into());
    }
    Ok(())
}

/// Splits `rows` into budget-sized chunks and renders each one with `render`.
pub(crate) fn render_chunks<F>(
    rows: &[EntityMapping],
    budget: usize,
    mut render: F,
) -> Result<Vec<Statement>>
where
    F: FnMut(&[EntityMapping]) -> Result<String>,
{
    let columns = rows.first().map_or(1, |r| r.fields.len());
    let per_chunk = chunk_rows(budget, columns);
    rows.chunks(per_chunk)
        .map(|chunk| {
            let mut params = ParameterBindings::new();
            for row in chunk {
                params.extend(row.params.clone())?;
            }
            Ok(Statement::new(render(chunk)?, params))
        })
        .collect()
}

/// Joins chunk statements into one for display or single-shot execution.
pub(crate) fn combine(chunks: &[Statement]) -> Result<Statement> {
    let mut params = ParameterBindings::new();
    let mut sql = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        params.extend(chunk.params.clone())?;
        sql.push(chunk.sql.as_str());
    }
    Ok(Statement::new(sql.join(";\n"), params))
}

/// Runs chunks in order inside one transaction and sums affected rows.
pub async fn execute_chunks(
    executor: &dyn Executor,
    table: &str,
    chunks: &[Statement],
) -> Result<u64> {
    info!(table, chunks = chunks.len(), "executing batch");
    Ok(run_in_transaction(executor, chunks).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::entity::test_support::Product;

    fn rows(n: usize) -> Vec<EntityMapping> {
        (0..n)
            .map(|i| {
                EntityMapping::from_entity(&Product::new(i as i64, "x"), i, None).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_chunk_rows() {
        assert_eq!(chunk_rows(2000, 2), 1000);
        assert_eq!(chunk_rows(2000, 3), 666);
        assert_eq!(chunk_rows(2000, 4000), 1);
        assert_eq!(chunk_rows(10, 0), 10);
    }

    #[test]
    fn test_render_chunks_splits_bindings() {
        let rows = rows(5);
        let chunks = render_chunks(&rows, 4, |chunk| Ok(format!("{} rows", chunk.len()))).unwrap();
        let sql: Vec<&str> = chunks.iter().map(|c| c.sql.as_str()).collect();
        assert_eq!(sql, vec!["2 rows", "2 rows", "1 rows"]);
        assert_eq!(chunks[2].params.len(), 2);
        assert!(chunks[2].params.contains("ProductId_5"));
    }

    #[test]
    fn test_layout_checks() {
        assert!(matches!(
            check_layout("Product", &[]),
            Err(crate::Error::Configuration(ConfigurationError::EmptyBatch(_)))
        ));
        let mut rows = rows(3);
        rows[2].ignore_columns(&["ProductName"]);
        assert!(matches!(
            check_layout("Product", &rows),
            Err(crate::Error::Configuration(ConfigurationError::RowShapeMismatch { row: 2, .. }))
        ));
    }
}
