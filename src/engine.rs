/// Engine facade.
///
/// A [`SqlEngine`] ties one dialect to a shared [`DialectCatalog`] and
/// [`PlanCache`], and hands out statement builders. Cloning is cheap; clones
/// share the catalog and the cache.
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::ast::cache::{self, PlanCache};
use crate::ast::{signature, ExprCompiler, Node, ResolveOptions};
use crate::config::EngineConfig;
use crate::dialect::{Dialect, DialectCatalog, DialectProfile, FunctionRenderer};
use crate::error::Result;
use crate::statement::params::ParameterBindings;
use crate::statement::{
    DeleteBuilder, Entity, EntityMapping, FieldMetadata, InsertBuilder, QueryBuilder, UpdateBuilder,
};

#[derive(Clone)]
pub struct SqlEngine {
    catalog: Arc<DialectCatalog>,
    cache: Arc<PlanCache>,
    config: Arc<EngineConfig>,
}

impl SqlEngine {
    /// Engine with default settings and its own catalog and cache.
    pub fn new(dialect: Dialect) -> Self {
        let config = EngineConfig {
            dialect,
            ..EngineConfig::default()
        };
        Self::with_parts(
            config,
            Arc::new(DialectCatalog::new()),
            Arc::new(PlanCache::new()),
        )
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache = match config.cache_capacity {
            Some(capacity) => PlanCache::with_capacity(capacity),
            None => PlanCache::new(),
        };
        Ok(Self::with_parts(
            config,
            Arc::new(DialectCatalog::new()),
            Arc::new(cache),
        ))
    }

    /// Engine over an existing catalog and cache, e.g. one per dialect
    /// sharing a single process-wide cache.
    pub fn with_parts(
        config: EngineConfig,
        catalog: Arc<DialectCatalog>,
        cache: Arc<PlanCache>,
    ) -> Self {
        Self {
            catalog,
            cache,
            config: Arc::new(config),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profile(&self) -> &DialectProfile {
        self.catalog.profile(self.dialect())
    }

    pub fn catalog(&self) -> &DialectCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    /// Compiles `node` and binds its values into `params` under fresh names.
    ///
    /// The shape is compiled once per dialect and options; later calls with
    /// the same shape rebind the cached template against `node`'s values.
    pub fn compile(
        &self,
        node: &Node,
        options: ResolveOptions,
        params: &mut ParameterBindings,
    ) -> Result<String> {
        let profile = self.profile();
        let key = format!(
            "{}|{}|{}",
            self.dialect(),
            options.cache_key(),
            signature::of(node)
        );

        let mut first_pass = None;
        let (fragment, _) = self.cache.get_or_compile(&key, || {
            let compilation = ExprCompiler::new(profile, options).compile(node)?;
            first_pass = Some(compilation.values);
            Ok(compilation.fragment)
        })?;
        let values = match first_pass {
            Some(values) => values,
            None => cache::resolve_values(&fragment, node)?,
        };

        let sql = cache::bind(&fragment, &values, profile, params);
        trace!(sql = %sql, "compiled expression");
        Ok(sql)
    }

    /// Adds or overrides a function for this engine's dialect.
    ///
    /// Cached plans may embed the previous rendering, so the cache is cleared.
    pub fn register_function(&self, name: &str, renderer: FunctionRenderer) {
        self.catalog
            .register_function(self.dialect(), name, renderer);
        self.cache.clear();
    }

    // ==================== Builders ====================

    pub fn query(&self, table: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(self.clone(), table)
    }

    pub fn query_entity<T: Entity>(&self) -> QueryBuilder {
        self.query(T::table_name())
    }

    pub fn union(&self, queries: Vec<QueryBuilder>) -> Result<QueryBuilder> {
        QueryBuilder::union(self.clone(), queries, false)
    }

    pub fn union_all(&self, queries: Vec<QueryBuilder>) -> Result<QueryBuilder> {
        QueryBuilder::union(self.clone(), queries, true)
    }

    pub fn insert<T: Entity>(&self, entity: &T) -> Result<InsertBuilder> {
        let mapping = EntityMapping::from_entity(entity, 0, None)?;
        Ok(InsertBuilder::new(self.clone(), T::table_name(), vec![mapping], false))
    }

    pub fn insert_batch<T: Entity>(&self, entities: &[T]) -> Result<InsertBuilder> {
        let rows = map_rows(entities)?;
        Ok(InsertBuilder::new(self.clone(), T::table_name(), rows, true))
    }

    pub fn update<T: Entity>(&self, entity: &T) -> Result<UpdateBuilder> {
        let mapping = EntityMapping::from_entity(entity, 0, None)?;
        Ok(UpdateBuilder::new(self.clone(), T::table_name(), vec![mapping], false))
    }

    pub fn update_batch<T: Entity>(&self, entities: &[T]) -> Result<UpdateBuilder> {
        let rows = map_rows(entities)?;
        Ok(UpdateBuilder::new(self.clone(), T::table_name(), rows, true))
    }

    /// Inserts one row given as raw fields, e.g. `[("Name", Value::from("Lamp"))]`.
    pub fn insert_fields<I, F>(&self, table: impl Into<String>, fields: I) -> Result<InsertBuilder>
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldMetadata>,
    {
        let mapping = map_fields(fields, 0)?;
        Ok(InsertBuilder::new(self.clone(), table, vec![mapping], false))
    }

    pub fn insert_fields_batch<R, I, F>(
        &self,
        table: impl Into<String>,
        rows: R,
    ) -> Result<InsertBuilder>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = F>,
        F: Into<FieldMetadata>,
    {
        let rows = map_field_rows(rows)?;
        Ok(InsertBuilder::new(self.clone(), table, rows, true))
    }

    /// Updates one row given as raw fields. Mark the correlating column with
    /// [`FieldMetadata::key`] or name it with `where_column`.
    pub fn update_fields<I, F>(&self, table: impl Into<String>, fields: I) -> Result<UpdateBuilder>
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldMetadata>,
    {
        let mapping = map_fields(fields, 0)?;
        Ok(UpdateBuilder::new(self.clone(), table, vec![mapping], false))
    }

    pub fn update_fields_batch<R, I, F>(
        &self,
        table: impl Into<String>,
        rows: R,
    ) -> Result<UpdateBuilder>
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = F>,
        F: Into<FieldMetadata>,
    {
        let rows = map_field_rows(rows)?;
        Ok(UpdateBuilder::new(self.clone(), table, rows, true))
    }

    pub fn delete(&self, table: impl Into<String>) -> DeleteBuilder {
        DeleteBuilder::new(self.clone(), table)
    }

    pub fn delete_entity<T: Entity>(&self) -> DeleteBuilder {
        self.delete(T::table_name())
    }
}

fn map_rows<T: Entity>(entities: &[T]) -> Result<Vec<EntityMapping>> {
    let mut rows = Vec::with_capacity(entities.len());
    for (i, entity) in entities.iter().enumerate() {
        rows.push(EntityMapping::from_entity(entity, i, None)?);
    }
    Ok(rows)
}

fn map_fields<I, F>(fields: I, row_index: usize) -> Result<EntityMapping>
where
    I: IntoIterator<Item = F>,
    F: Into<FieldMetadata>,
{
    let fields = fields.into_iter().map(Into::into).collect();
    Ok(EntityMapping::from_fields(fields, row_index)?)
}

fn map_field_rows<R, I, F>(rows: R) -> Result<Vec<EntityMapping>>
where
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = F>,
    F: Into<FieldMetadata>,
{
    rows.into_iter()
        .enumerate()
        .map(|(i, fields)| map_fields(fields, i))
        .collect()
}

impl fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlEngine")
            .field("dialect", &self.dialect())
            .field("cache", &self.cache.stats())
            .finish()
    }
}
