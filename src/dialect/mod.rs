/// Dialect catalog.
///
/// Each supported database gets one [`DialectProfile`] holding its parameter
/// prefix, identifier quotes, boolean literals, conversion type names and a
/// function table. The function table is open: callers can add or override
/// renderers at runtime without touching the compiler.
pub mod builtin;
pub mod functions;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::ast::{Call, DeclaredType, ExprCompiler};
use crate::error::CompileError;

/// Renders one function call. The renderer emits its own parenthesization
/// through the compiler it is handed.
pub type FunctionRenderer =
    Arc<dyn Fn(&mut ExprCompiler<'_>, &Call) -> Result<(), CompileError> + Send + Sync>;

/// Supported target databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    SqlServer,
    #[default]
    MySql,
    Oracle,
    PostgreSql,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::SqlServer,
        Dialect::MySql,
        Dialect::Oracle,
        Dialect::PostgreSql,
        Dialect::Sqlite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::MySql => "mysql",
            Dialect::Oracle => "oracle",
            Dialect::PostgreSql => "postgresql",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn ordinal(&self) -> usize {
        match self {
            Dialect::SqlServer => 0,
            Dialect::MySql => 1,
            Dialect::Oracle => 2,
            Dialect::PostgreSql => 3,
            Dialect::Sqlite => 4,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dialect: {}", s))
    }
}

/// Syntax rules and function table of one database.
pub struct DialectProfile {
    dialect: Dialect,
    parameter_prefix: char,
    identifier_quote: (char, char),
    true_literal: &'static str,
    false_literal: &'static str,
    type_names: HashMap<DeclaredType, &'static str>,
    /// Keyed by lower-cased function name.
    functions: RwLock<HashMap<String, FunctionRenderer>>,
}

impl DialectProfile {
    pub fn new(dialect: Dialect, parameter_prefix: char, identifier_quote: (char, char)) -> Self {
        Self {
            dialect,
            parameter_prefix,
            identifier_quote,
            true_literal: "1",
            false_literal: "0",
            type_names: HashMap::new(),
            functions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_bool_literals(mut self, true_literal: &'static str, false_literal: &'static str) -> Self {
        self.true_literal = true_literal;
        self.false_literal = false_literal;
        self
    }

    pub fn with_type(mut self, ty: DeclaredType, sql_type: &'static str) -> Self {
        self.type_names.insert(ty, sql_type);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn parameter_prefix(&self) -> char {
        self.parameter_prefix
    }

    pub fn identifier_quote(&self) -> (char, char) {
        self.identifier_quote
    }

    pub fn true_literal(&self) -> &'static str {
        self.true_literal
    }

    pub fn false_literal(&self) -> &'static str {
        self.false_literal
    }

    /// SQL type used when converting to `ty`, if the dialect has one.
    pub fn type_name(&self, ty: DeclaredType) -> Option<&'static str> {
        self.type_names.get(&ty).copied()
    }

    /// Quotes an identifier, doubling any embedded closing quote.
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = self.identifier_quote;
        let escaped = ident.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", open, escaped, close)
    }

    /// Parameter reference as written into SQL.
    pub fn placeholder(&self, name: &str) -> String {
        format!("{}{}", self.parameter_prefix, name)
    }

    /// Adds or replaces a function renderer. Lookup is case-insensitive.
    pub fn register_function(&self, name: &str, renderer: FunctionRenderer) {
        let mut functions = self
            .functions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        functions.insert(name.to_ascii_lowercase(), renderer);
    }

    pub fn function(&self, name: &str) -> Option<FunctionRenderer> {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        functions.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.function(name).is_some()
    }

    /// Registered function names, sorted.
    pub fn function_names(&self) -> Vec<String> {
        let functions = self
            .functions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = functions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for DialectProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectProfile")
            .field("dialect", &self.dialect)
            .field("parameter_prefix", &self.parameter_prefix)
            .field("identifier_quote", &self.identifier_quote)
            .field("functions", &self.function_names().len())
            .finish()
    }
}

/// All five builtin profiles.
#[derive(Debug)]
pub struct DialectCatalog {
    profiles: Vec<DialectProfile>,
}

impl Default for DialectCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DialectCatalog {
    pub fn new() -> Self {
        // Order follows `Dialect::ordinal`.
        Self {
            profiles: vec![
                builtin::sqlserver::profile(),
                builtin::mysql::profile(),
                builtin::oracle::profile(),
                builtin::postgresql::profile(),
                builtin::sqlite::profile(),
            ],
        }
    }

    pub fn profile(&self, dialect: Dialect) -> &DialectProfile {
        &self.profiles[dialect.ordinal()]
    }

    pub fn register_function(&self, dialect: Dialect, name: &str, renderer: FunctionRenderer) {
        self.profile(dialect).register_function(name, renderer);
    }

    pub fn dialects(&self) -> impl Iterator<Item = Dialect> + '_ {
        self.profiles.iter().map(|p| p.dialect)
    }
}
