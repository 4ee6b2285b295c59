//! Builtin dialect profiles.
//!
//! Functions every dialect renders the same way are registered here; each
//! dialect module adds its own spellings on top.

pub mod mysql;
pub mod oracle;
pub mod postgresql;
pub mod sqlite;
pub mod sqlserver;

use super::functions::{self, binary, count, like, membership, ranged, unary};
use super::DialectProfile;
use crate::ast::{DeclaredType, FormatTemplate};

/// Registers the dialect-independent part of the function table.
pub fn register_common(profile: &DialectProfile) {
    // Aggregates
    profile.register_function("Count", count());
    profile.register_function("Max", unary("MAX"));
    profile.register_function("Min", unary("MIN"));
    profile.register_function("Sum", unary("SUM"));
    profile.register_function("Avg", unary("AVG"));

    // Math
    profile.register_function("Abs", unary("ABS"));
    profile.register_function("Round", functions::round(false));

    // Strings
    profile.register_function("ToUpper", unary("UPPER"));
    profile.register_function("ToLower", unary("LOWER"));
    profile.register_function("Trim", unary("TRIM"));
    profile.register_function("TrimStart", unary("LTRIM"));
    profile.register_function("TrimEnd", unary("RTRIM"));
    profile.register_function("Replace", functions::replace());
    profile.register_function("StartsWith", like(FormatTemplate::starts_with()));
    profile.register_function("EndsWith", like(FormatTemplate::ends_with()));
    profile.register_function("Contains", functions::contains());

    // Sets and comparison
    profile.register_function("In", membership(false));
    profile.register_function("NotIn", membership(true));
    profile.register_function("Equals", functions::equals());
    profile.register_function("SubQuery", functions::sub_query());
    profile.register_function(
        "Coalesce",
        ranged(2, 16, |a| format!("COALESCE({})", a.join(", "))),
    );

    // Conversions
    profile.register_function("ToString", functions::conversion(DeclaredType::Text));
    profile.register_function("ToInt", functions::conversion(DeclaredType::Int));
    profile.register_function("ToLong", functions::conversion(DeclaredType::Int));
    profile.register_function("ToFloat", functions::conversion(DeclaredType::Float));
    profile.register_function("ToDouble", functions::conversion(DeclaredType::Float));
    profile.register_function("ToDecimal", functions::conversion(DeclaredType::Float));
    profile.register_function("ToDateTime", functions::conversion(DeclaredType::DateTime));
    profile.register_function("ToBool", functions::conversion(DeclaredType::Bool));
    profile.register_function("Cast", functions::cast());
}

/// Registers `IfNull` under the dialect's spelling.
fn register_if_null(profile: &DialectProfile, sql_name: &'static str) {
    profile.register_function("IfNull", binary(sql_name));
}

/// Registers `Length` under the dialect's spelling.
fn register_length(profile: &DialectProfile, sql_name: &'static str) {
    profile.register_function("Length", unary(sql_name));
    profile.register_function("Len", unary(sql_name));
}

/// Plain `NAME(x)` extraction for dialects with `YEAR()`-style functions.
fn named_part(unit: functions::DateUnit, date: &str) -> String {
    format!("{}({})", unit.keyword(), date)
}

/// `EXTRACT(UNIT FROM x)`
fn extract_part(unit: functions::DateUnit, date: &str) -> String {
    format!("EXTRACT({} FROM {})", unit.keyword(), date)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ast::{ExprCompiler, Node, ResolveOptions};
    use crate::dialect::{Dialect, DialectCatalog};

    /// Compiles `node` in select mode and returns the template text.
    pub fn render(dialect: Dialect, node: &Node) -> String {
        let catalog = DialectCatalog::new();
        ExprCompiler::new(catalog.profile(dialect), ResolveOptions::select())
            .compile(node)
            .unwrap()
            .fragment
            .sql_template
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::render;
    use crate::ast::{DeclaredType, ExprCompiler, Node, ResolveOptions};
    use crate::dialect::{Dialect, DialectCatalog};
    use crate::error::CompileError;

    #[test]
    fn test_common_functions_in_every_dialect() {
        let node = Node::column("p", "Name").method("ToUpper", vec![]);
        assert_eq!(render(Dialect::MySql, &node), "UPPER(p.`Name`)");
        assert_eq!(render(Dialect::Oracle, &node), "UPPER(p.\"Name\")");
    }

    #[test]
    fn test_like_templates() {
        let node = Node::column("p", "Name").starts_with("ab");
        assert_eq!(render(Dialect::MySql, &node), "p.`Name` LIKE {{0}}");
    }

    #[test]
    fn test_contains_on_collection_is_membership() {
        let node = Node::var("ids", vec![1, 2, 3]).contains(Node::column("p", "Id"));
        assert_eq!(render(Dialect::SqlServer, &node), "p.[Id] IN ({{0}})");
    }

    #[test]
    fn test_in_and_not_in() {
        let node = Node::column("p", "Id").not_in(Node::lit(vec![1, 2]));
        assert_eq!(render(Dialect::MySql, &node), "p.`Id` NOT IN ({{0}})");
    }

    #[test]
    fn test_count_without_argument() {
        assert_eq!(render(Dialect::Sqlite, &Node::call("Count", vec![])), "COUNT(1)");
        assert_eq!(
            render(Dialect::Sqlite, &Node::column("p", "Id").count()),
            "COUNT(p.[Id])"
        );
    }

    #[test]
    fn test_conversion_uses_type_table() {
        let node = Node::column("p", "Qty").method("ToString", vec![]);
        assert_eq!(
            render(Dialect::PostgreSql, &node),
            "CAST(p.\"Qty\" AS TEXT)"
        );
        let node = Node::column("p", "Qty").cast(DeclaredType::Int);
        assert_eq!(render(Dialect::MySql, &node), "CAST(p.`Qty` AS SIGNED)");
    }

    #[test]
    fn test_missing_conversion_names_type() {
        let catalog = DialectCatalog::new();
        let node = Node::column("p", "Flag").method("ToBool", vec![]);
        let err = ExprCompiler::new(catalog.profile(Dialect::MySql), ResolveOptions::select())
            .compile(&node)
            .unwrap_err();
        assert_eq!(err, CompileError::UnsupportedConversion("Bool".into()));
    }

    #[test]
    fn test_too_many_arguments() {
        let catalog = DialectCatalog::new();
        let node = Node::call("Abs", vec![Node::column("p", "A"), Node::column("p", "B")]);
        let err = ExprCompiler::new(catalog.profile(Dialect::MySql), ResolveOptions::select())
            .compile(&node)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { .. }));
    }

    #[test]
    fn test_date_unit_must_be_a_keyword() {
        let catalog = DialectCatalog::new();
        let node = Node::call(
            "DateDiff",
            vec![Node::lit("day"), Node::column("p", "A"), Node::column("p", "B")],
        );
        let err = ExprCompiler::new(catalog.profile(Dialect::MySql), ResolveOptions::select())
            .compile(&node)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidArgument { .. }));
    }
}
