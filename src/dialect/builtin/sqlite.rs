//! SQLite profile: `@name` parameters, bracket quoting, text timestamps.

use super::{register_common, register_if_null, register_length};
use crate::ast::DeclaredType;
use crate::dialect::functions::{
    self, date_diff, register_date_add, register_date_parts, DateUnit,
};
use crate::dialect::{Dialect, DialectProfile};

fn strftime_field(unit: DateUnit) -> &'static str {
    match unit {
        DateUnit::Year => "%Y",
        DateUnit::Month => "%m",
        DateUnit::Day => "%d",
        DateUnit::Hour => "%H",
        DateUnit::Minute => "%M",
        DateUnit::Second => "%S",
    }
}

fn strftime_int(unit: DateUnit, date: &str) -> String {
    format!("CAST(STRFTIME('{}', {}) AS INTEGER)", strftime_field(unit), date)
}

pub fn profile() -> DialectProfile {
    // Timestamps are stored as text; there is no datetime cast target.
    let profile = DialectProfile::new(Dialect::Sqlite, '@', ('[', ']'))
        .with_type(DeclaredType::Text, "TEXT")
        .with_type(DeclaredType::Int, "INTEGER")
        .with_type(DeclaredType::Float, "REAL")
        .with_type(DeclaredType::Bool, "INTEGER");

    register_common(&profile);
    register_if_null(&profile, "IFNULL");
    register_length(&profile, "LENGTH");
    profile.register_function("Substring", functions::substring("SUBSTR", None));

    register_date_add(&profile, |unit, date, amount| {
        format!(
            "DATETIME({}, ({}) || ' {}S')",
            date,
            amount,
            unit.keyword()
        )
    });
    register_date_parts(&profile, strftime_int);
    profile.register_function(
        "DateDiff",
        date_diff(|unit, start, end| match unit.seconds() {
            Some(seconds) => format!(
                "CAST((JULIANDAY({}) - JULIANDAY({})) * {} AS INTEGER)",
                end,
                start,
                86_400 / seconds
            ),
            None if unit == DateUnit::Year => format!(
                "({} - {})",
                strftime_int(DateUnit::Year, end),
                strftime_int(DateUnit::Year, start)
            ),
            None => format!(
                "(({} - {}) * 12 + {} - {})",
                strftime_int(DateUnit::Year, end),
                strftime_int(DateUnit::Year, start),
                strftime_int(DateUnit::Month, end),
                strftime_int(DateUnit::Month, start)
            ),
        }),
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::super::test_support::render;
    use crate::ast::{DeclaredType, ExprCompiler, Node, ResolveOptions};
    use crate::dialect::{Dialect, DialectCatalog};
    use crate::error::CompileError;

    #[test]
    fn test_date_modifier() {
        let node = Node::column("p", "At").method("AddMinutes", vec![Node::lit(5)]);
        assert_eq!(
            render(Dialect::Sqlite, &node),
            "DATETIME(p.[At], ({{0}}) || ' MINUTES')"
        );
    }

    #[test]
    fn test_parts_use_strftime() {
        let node = Node::call("Day", vec![Node::column("p", "At")]);
        assert_eq!(
            render(Dialect::Sqlite, &node),
            "CAST(STRFTIME('%d', p.[At]) AS INTEGER)"
        );
    }

    #[test]
    fn test_no_datetime_conversion() {
        let catalog = DialectCatalog::new();
        let node = Node::column("p", "At").cast(DeclaredType::DateTime);
        let err = ExprCompiler::new(catalog.profile(Dialect::Sqlite), ResolveOptions::select())
            .compile(&node)
            .unwrap_err();
        assert_eq!(err, CompileError::UnsupportedConversion("DateTime".into()));
    }
}
