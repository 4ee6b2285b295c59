/// Expression trees and their compilation into SQL.
///
/// ```text
/// Node tree (types.rs, builder.rs)
///       ↓
/// Shape signature          (signature.rs)
///       ↓
/// Plan cache lookup        (cache.rs)
///       ↓  miss
/// Expression compiler      (compiler.rs)
///       ↓
/// Template + value sites → rebind → SQL fragment with named parameters
/// ```
///
/// A compiled fragment depends only on the tree's shape, so it is cached
/// and rebound against the values of every later tree with the same shape.
pub mod builder;
pub mod cache;
pub mod compiler;
pub mod signature;
pub mod types;

// Re-export key types for convenience
pub use cache::{CacheStats, PlanCache};
pub use compiler::{
    CapturedValueRef, Compilation, CompiledFragment, ExprCompiler, FormatTemplate, PathStep,
    PlanEntry, ResolveMode, ResolveOptions,
};
pub use types::*;
