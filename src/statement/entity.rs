use crate::ast::Value;
use crate::error::ConfigurationError;

use super::params::ParameterBindings;

/// One field of a row as reported by the metadata provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMetadata {
    pub column: String,
    pub is_primary_key: bool,
    /// Present on the type but not stored in the table.
    pub not_mapped: bool,
    pub value: Value,
}

impl FieldMetadata {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            is_primary_key: false,
            not_mapped: false,
            value: value.into(),
        }
    }

    pub fn key(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            is_primary_key: true,
            ..Self::new(column, value)
        }
    }

    pub fn not_mapped(mut self) -> Self {
        self.not_mapped = true;
        self
    }
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for FieldMetadata {
    fn from((column, value): (K, V)) -> Self {
        Self::new(column, value)
    }
}

/// Metadata provider for a row type.
///
/// ```ignore
/// impl Entity for Product {
///     fn table_name() -> &'static str { "Product" }
///     fn fields(&self) -> Vec<FieldMetadata> {
///         vec![FieldMetadata::key("ProductId", self.id), FieldMetadata::new("Name", self.name.as_str())]
///     }
/// }
/// ```
pub trait Entity {
    fn table_name() -> &'static str;
    fn fields(&self) -> Vec<FieldMetadata>;
}

/// A mapped field with the parameter name its value is bound under.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub column: String,
    pub is_primary_key: bool,
    pub identity: String,
}

/// Column layout and bindings of one row being written.
///
/// Parameter identities are `{column}_{row}` with a 1-based row number, so
/// the mappings of many rows can share one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    pub fields: Vec<FieldBinding>,
    pub params: ParameterBindings,
}

impl EntityMapping {
    /// Maps `fields` for row `row_index` (0-based), skipping not-mapped ones.
    pub fn from_fields(
        fields: Vec<FieldMetadata>,
        row_index: usize,
    ) -> Result<Self, ConfigurationError> {
        let mut mapping = EntityMapping {
            fields: Vec::with_capacity(fields.len()),
            params: ParameterBindings::new(),
        };
        for field in fields.into_iter().filter(|f| !f.not_mapped) {
            let identity = format!("{}_{}", field.column, row_index + 1);
            mapping.params.insert(identity.clone(), field.value)?;
            mapping.fields.push(FieldBinding {
                column: field.column,
                is_primary_key: field.is_primary_key,
                identity,
            });
        }
        Ok(mapping)
    }

    /// Maps an entity, keeping only fields accepted by `filter` when given.
    pub fn from_entity<T: Entity>(
        entity: &T,
        row_index: usize,
        filter: Option<&dyn Fn(&FieldMetadata) -> bool>,
    ) -> Result<Self, ConfigurationError> {
        let fields = entity
            .fields()
            .into_iter()
            .filter(|f| filter.map_or(true, |keep| keep(f)))
            .collect();
        Self::from_fields(fields, row_index)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldBinding> {
        self.fields.iter().filter(|f| f.is_primary_key)
    }

    /// Drops every field `keep` rejects, along with its parameter.
    pub fn retain(&mut self, mut keep: impl FnMut(&FieldBinding) -> bool) {
        let params = &mut self.params;
        self.fields.retain(|field| {
            let kept = keep(field);
            if !kept {
                params.remove(&field.identity);
            }
            kept
        });
    }

    /// Keeps only the named columns.
    pub fn keep_columns(&mut self, columns: &[&str], keep_keys: bool) {
        self.retain(|f| (keep_keys && f.is_primary_key) || columns.contains(&f.column.as_str()));
    }

    pub fn ignore_columns(&mut self, columns: &[&str]) {
        self.retain(|f| !columns.contains(&f.column.as_str()));
    }

    /// Makes exactly the named columns the correlation key.
    pub fn set_key_columns(&mut self, columns: &[&str]) {
        for field in &mut self.fields {
            field.is_primary_key = columns.contains(&field.column.as_str());
        }
    }

    pub fn same_layout(&self, other: &EntityMapping) -> bool {
        self.columns().eq(other.columns())
    }
}
