//! Oracle profile: `:name` parameters, double-quote identifiers.

use super::{extract_part, register_common, register_if_null, register_length};
use crate::ast::DeclaredType;
use crate::dialect::functions::{
    self, date_diff, register_date_add, register_date_parts, unary, DateUnit,
};
use crate::dialect::{Dialect, DialectProfile};

pub fn profile() -> DialectProfile {
    let profile = DialectProfile::new(Dialect::Oracle, ':', ('"', '"'))
        .with_type(DeclaredType::Text, "VARCHAR2(4000)")
        .with_type(DeclaredType::Int, "NUMBER(19)")
        .with_type(DeclaredType::Float, "BINARY_DOUBLE")
        .with_type(DeclaredType::DateTime, "TIMESTAMP");

    register_common(&profile);
    register_if_null(&profile, "NVL");
    register_length(&profile, "LENGTH");
    profile.register_function("Substring", functions::substring("SUBSTR", None));
    profile.register_function("Floor", unary("FLOOR"));
    profile.register_function("Ceiling", unary("CEIL"));

    register_date_add(&profile, |unit, date, amount| match unit {
        DateUnit::Year => format!("ADD_MONTHS({}, ({}) * 12)", date, amount),
        DateUnit::Month => format!("ADD_MONTHS({}, {})", date, amount),
        _ => format!(
            "({} + NUMTODSINTERVAL({}, '{}'))",
            date,
            amount,
            unit.keyword()
        ),
    });
    register_date_parts(&profile, extract_part);
    profile.register_function(
        "DateDiff",
        date_diff(|unit, start, end| match unit.seconds() {
            Some(seconds) => format!(
                "FLOOR((CAST({} AS DATE) - CAST({} AS DATE)) * {})",
                end,
                start,
                86_400 / seconds
            ),
            None if unit == DateUnit::Year => {
                format!("FLOOR(MONTHS_BETWEEN({}, {}) / 12)", end, start)
            }
            None => format!("FLOOR(MONTHS_BETWEEN({}, {}))", end, start),
        }),
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::super::test_support::render;
    use crate::ast::Node;
    use crate::dialect::Dialect;

    #[test]
    fn test_year_arithmetic_goes_through_months() {
        let node = Node::column("p", "HiredAt").method("AddYears", vec![Node::lit(1)]);
        assert_eq!(
            render(Dialect::Oracle, &node),
            "ADD_MONTHS(p.\"HiredAt\", ({{0}}) * 12)"
        );
    }

    #[test]
    fn test_extract_and_nvl() {
        let node = Node::call("Year", vec![Node::column("p", "HiredAt")]);
        assert_eq!(
            render(Dialect::Oracle, &node),
            "EXTRACT(YEAR FROM p.\"HiredAt\")"
        );
        let node = Node::call("IfNull", vec![Node::column("p", "Bonus"), Node::lit(0)]);
        assert_eq!(render(Dialect::Oracle, &node), "NVL(p.\"Bonus\", {{0}})");
    }

    #[test]
    fn test_date_diff_in_hours() {
        let node = Node::call(
            "DateDiff",
            vec![Node::keyword("HOUR"), Node::column("p", "A"), Node::column("p", "B")],
        );
        assert_eq!(
            render(Dialect::Oracle, &node),
            "FLOOR((CAST(p.\"B\" AS DATE) - CAST(p.\"A\" AS DATE)) * 24)"
        );
    }
}
