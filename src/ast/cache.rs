/// Plan cache and parameter binding.
///
/// A compiled fragment is stored once per `(dialect, options, signature)` key.
/// Later trees with the same shape skip the compiler: their values are pulled
/// out through the fragment's parameter plan and bound into fresh names.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use super::compiler::CompiledFragment;
use super::types::{Node, Value};
use crate::dialect::DialectProfile;
use crate::error::{CacheConsistencyError, CompileError};
use crate::scan;
use crate::statement::params::{hint_of, ParameterBindings};
use crate::statement::Statement;

type Slot = Arc<OnceLock<Result<Arc<CompiledFragment>, CompileError>>>;

#[derive(Default)]
struct Slots {
    map: HashMap<String, Slot>,
    /// Insertion order, for capacity eviction.
    order: VecDeque<String>,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Process-wide store of compiled fragments.
///
/// Concurrent requests for a key that is not cached yet compile once; every
/// other caller blocks on the same slot and receives the same fragment.
#[derive(Default)]
pub struct PlanCache {
    slots: Mutex<Slots>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    /// Unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` shapes; the oldest is evicted first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Returns the fragment for `key`, running `compile` if no caller has
    /// done so yet. The flag is true when this call ran the compiler.
    ///
    /// A failed compilation is handed to the callers waiting on it and then
    /// dropped, so the next request compiles again.
    pub fn get_or_compile<F>(
        &self,
        key: &str,
        compile: F,
    ) -> Result<(Arc<CompiledFragment>, bool), CompileError>
    where
        F: FnOnce() -> Result<CompiledFragment, CompileError>,
    {
        let slot = self.slot(key);
        let mut fresh = false;
        let result = slot
            .get_or_init(|| {
                fresh = true;
                compile().map(Arc::new)
            })
            .clone();

        if fresh {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "plan cache miss");
            if result.is_err() {
                self.discard(key, &slot);
            }
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "plan cache hit");
        }
        result.map(|fragment| (fragment, fresh))
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.lock();
        if let Some(slot) = slots.map.get(key) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.map.insert(key.to_string(), Arc::clone(&slot));
        slots.order.push_back(key.to_string());
        if let Some(capacity) = self.capacity {
            while slots.map.len() > capacity {
                let Some(oldest) = slots.order.pop_front() else {
                    break;
                };
                slots.map.remove(&oldest);
                debug!(key = %oldest, "plan cache eviction");
            }
        }
        slot
    }

    fn discard(&self, key: &str, slot: &Slot) {
        let mut slots = self.lock();
        if slots.map.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.map.remove(key);
            slots.order.retain(|k| k != key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.map.clear();
        slots.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Pulls the current values for `fragment`'s plan out of `node`.
pub fn resolve_values(
    fragment: &CompiledFragment,
    node: &Node,
) -> Result<Vec<Value>, CacheConsistencyError> {
    let sites = node.value_sites();
    fragment
        .parameter_plan
        .iter()
        .map(|entry| entry.source.resolve(&sites))
        .collect()
}

/// Binds `values` under fresh names and writes them into the template.
///
/// Lists expand to one parameter per element (`NULL` when empty) and
/// sub-queries are spliced in with their parameters renamed into `params`.
pub fn bind(
    fragment: &CompiledFragment,
    values: &[Value],
    profile: &DialectProfile,
    params: &mut ParameterBindings,
) -> String {
    let mut rendered = Vec::with_capacity(values.len());
    for (entry, value) in fragment.parameter_plan.iter().zip(values) {
        let text = match value {
            Value::List(items) if items.is_empty() => "NULL".to_string(),
            Value::List(items) => items
                .iter()
                .map(|item| profile.placeholder(&params.bind_fresh(&entry.hint, item.clone())))
                .collect::<Vec<_>>()
                .join(", "),
            Value::SubQuery(statement) => splice(statement, profile, params),
            scalar => {
                let value = match &entry.template {
                    Some(template) => template.apply(scalar),
                    None => scalar.clone(),
                };
                profile.placeholder(&params.bind_fresh(&entry.hint, value))
            }
        };
        rendered.push(text);
    }
    scan::substitute_tokens(&fragment.sql_template, profile.identifier_quote(), |i| {
        rendered.get(i).map(String::as_str)
    })
}

/// Re-keys a finished statement's parameters into `params` and returns its
/// SQL with the references renamed to match.
pub fn splice(
    statement: &Statement,
    profile: &DialectProfile,
    params: &mut ParameterBindings,
) -> String {
    let mut renamed = HashMap::new();
    for (name, value) in statement.params.iter() {
        let fresh = params.bind_fresh(hint_of(name), value.clone());
        renamed.insert(name.to_string(), fresh);
    }
    scan::rewrite_parameters(
        &statement.sql,
        profile.parameter_prefix(),
        profile.identifier_quote(),
        |name| renamed.get(name).map(|fresh| profile.placeholder(fresh)),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;
    use crate::ast::{ExprCompiler, ResolveOptions};
    use crate::dialect::{Dialect, DialectCatalog};

    fn fragment(sql: &str) -> CompiledFragment {
        CompiledFragment {
            dialect: Dialect::MySql,
            sql_template: sql.to_string(),
            parameter_plan: vec![],
            signature: String::new(),
        }
    }

    #[test]
    fn test_second_request_is_a_hit() {
        let cache = PlanCache::new();
        let (_, fresh) = cache.get_or_compile("k", || Ok(fragment("a"))).unwrap();
        assert!(fresh);
        let (cached, fresh) = cache
            .get_or_compile("k", || panic!("compiled twice"))
            .unwrap();
        assert!(!fresh);
        assert_eq!(cached.sql_template, "a");
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = PlanCache::new();
        let err = cache
            .get_or_compile("k", || Err(CompileError::UnknownFunction("F".into())))
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownFunction("F".into()));
        assert!(cache.is_empty());
        assert!(cache.get_or_compile("k", || Ok(fragment("b"))).unwrap().1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = PlanCache::with_capacity(2);
        for key in ["a", "b", "c"] {
            cache.get_or_compile(key, || Ok(fragment(key))).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get_or_compile("a", || Ok(fragment("a"))).unwrap().1);
        assert!(!cache.get_or_compile("c", || Ok(fragment("c"))).unwrap().1);
    }

    #[test]
    fn test_concurrent_requests_compile_once() {
        let cache = Arc::new(PlanCache::new());
        let compiles = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let compiles = Arc::clone(&compiles);
                thread::spawn(move || {
                    cache
                        .get_or_compile("shared", || {
                            compiles.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok(fragment("x"))
                        })
                        .unwrap()
                        .0
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|f| Arc::ptr_eq(f, &results[0])));
    }

    #[test]
    fn test_bind_expands_lists() {
        let catalog = DialectCatalog::new();
        let profile = catalog.profile(Dialect::MySql);
        let node = Node::column("p", "Id").in_list(Node::var("ids", vec![4, 5, 6]));
        let out = ExprCompiler::new(profile, ResolveOptions::where_clause())
            .compile(&node)
            .unwrap();
        let mut params = ParameterBindings::new();
        let sql = bind(&out.fragment, &out.values, profile, &mut params);
        assert_eq!(sql, "p.`Id` IN (@Id_1, @Id_2, @Id_3)");
        assert_eq!(params.get("Id_3"), Some(&Value::Int(6)));

        let mut params = ParameterBindings::new();
        let sql = bind(&out.fragment, &[Value::List(vec![])], profile, &mut params);
        assert_eq!(sql, "p.`Id` IN (NULL)");
        assert!(params.is_empty());
    }

    #[test]
    fn test_bind_applies_like_template() {
        let catalog = DialectCatalog::new();
        let profile = catalog.profile(Dialect::SqlServer);
        let node = Node::column("p", "Name").ends_with("son");
        let out = ExprCompiler::new(profile, ResolveOptions::where_clause())
            .compile(&node)
            .unwrap();
        let mut params = ParameterBindings::new();
        let sql = bind(&out.fragment, &out.values, profile, &mut params);
        assert_eq!(sql, "p.[Name] LIKE @Name_1");
        assert_eq!(params.get("Name_1"), Some(&Value::from("%son")));
    }

    #[test]
    fn test_splice_renames_clashing_parameters() {
        let catalog = DialectCatalog::new();
        let profile = catalog.profile(Dialect::MySql);
        let mut inner = ParameterBindings::new();
        inner.insert("Id_1", Value::Int(9)).unwrap();
        let statement = Statement {
            sql: "SELECT o.`Id` FROM `Orders` o WHERE (o.`Id` > @Id_1)".to_string(),
            params: inner,
        };
        let mut params = ParameterBindings::new();
        params.insert("Id_1", Value::Int(1)).unwrap();
        let sql = splice(&statement, profile, &mut params);
        assert_eq!(sql, "SELECT o.`Id` FROM `Orders` o WHERE (o.`Id` > @Id_2)");
        assert_eq!(params.get("Id_2"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_resolve_values_follows_new_tree() {
        let catalog = DialectCatalog::new();
        let profile = catalog.profile(Dialect::MySql);
        let first = Node::column("p", "Age").gt(Node::var("min", 18));
        let out = ExprCompiler::new(profile, ResolveOptions::where_clause())
            .compile(&first)
            .unwrap();
        let second = Node::column("p", "Age").gt(Node::var("min", 21));
        assert_eq!(
            resolve_values(&out.fragment, &second).unwrap(),
            vec![Value::Int(21)]
        );
    }
}
