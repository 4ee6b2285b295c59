//! SQL Server profile: `@name` parameters, `[ident]` quoting.

use super::{named_part, register_common, register_if_null, register_length};
use crate::ast::DeclaredType;
use crate::dialect::functions::{self, date_diff, register_date_add, register_date_parts, unary};
use crate::dialect::{Dialect, DialectProfile};

pub fn profile() -> DialectProfile {
    let profile = DialectProfile::new(Dialect::SqlServer, '@', ('[', ']'))
        .with_type(DeclaredType::Text, "NVARCHAR(MAX)")
        .with_type(DeclaredType::Int, "BIGINT")
        .with_type(DeclaredType::Float, "FLOAT")
        .with_type(DeclaredType::DateTime, "DATETIME2")
        .with_type(DeclaredType::Bool, "BIT");

    register_common(&profile);
    register_if_null(&profile, "ISNULL");
    register_length(&profile, "LEN");
    profile.register_function(
        "Trim",
        functions::fixed(1, |a| format!("LTRIM(RTRIM({}))", a[0])),
    );
    profile.register_function("Round", functions::round(true));
    profile.register_function("Substring", functions::substring("SUBSTRING", Some("LEN")));
    profile.register_function("Floor", unary("FLOOR"));
    profile.register_function("Ceiling", unary("CEILING"));

    register_date_add(&profile, |unit, date, amount| {
        format!("DATEADD({}, {}, {})", unit.keyword(), amount, date)
    });
    register_date_parts(&profile, named_part);
    profile.register_function(
        "DateDiff",
        date_diff(|unit, start, end| format!("DATEDIFF({}, {}, {})", unit.keyword(), start, end)),
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::super::test_support::render;
    use crate::ast::Node;
    use crate::dialect::Dialect;

    #[test]
    fn test_date_add() {
        let node = Node::column("p", "CreatedAt").method("AddDays", vec![Node::lit(7)]);
        assert_eq!(
            render(Dialect::SqlServer, &node),
            "DATEADD(DAY, {{0}}, p.[CreatedAt])"
        );
    }

    #[test]
    fn test_substring_fills_length() {
        let node = Node::column("p", "Name").method("Substring", vec![Node::lit(2)]);
        assert_eq!(
            render(Dialect::SqlServer, &node),
            "SUBSTRING(p.[Name], {{0}}, LEN(p.[Name]))"
        );
    }

    #[test]
    fn test_trim_and_null_coalescing() {
        let node = Node::column("p", "Name").method("Trim", vec![]);
        assert_eq!(render(Dialect::SqlServer, &node), "LTRIM(RTRIM(p.[Name]))");
        let node = Node::call("IfNull", vec![Node::column("p", "Nick"), Node::column("p", "Name")]);
        assert_eq!(
            render(Dialect::SqlServer, &node),
            "ISNULL(p.[Nick], p.[Name])"
        );
    }

    #[test]
    fn test_date_diff() {
        let node = Node::call(
            "DateDiff",
            vec![Node::keyword("day"), Node::column("p", "Start"), Node::column("p", "End")],
        );
        assert_eq!(
            render(Dialect::SqlServer, &node),
            "DATEDIFF(DAY, p.[Start], p.[End])"
        );
    }
}
