//! MySQL profile: `@name` parameters, backtick quoting.

use super::{named_part, register_common, register_if_null, register_length};
use crate::ast::DeclaredType;
use crate::dialect::functions::{self, date_diff, register_date_add, register_date_parts, unary};
use crate::dialect::{Dialect, DialectProfile};

pub fn profile() -> DialectProfile {
    // No boolean cast target in MySQL.
    let profile = DialectProfile::new(Dialect::MySql, '@', ('`', '`'))
        .with_type(DeclaredType::Text, "CHAR")
        .with_type(DeclaredType::Int, "SIGNED")
        .with_type(DeclaredType::Float, "DECIMAL(38, 10)")
        .with_type(DeclaredType::DateTime, "DATETIME");

    register_common(&profile);
    register_if_null(&profile, "IFNULL");
    register_length(&profile, "CHAR_LENGTH");
    profile.register_function("Substring", functions::substring("SUBSTRING", None));
    profile.register_function("Floor", unary("FLOOR"));
    profile.register_function("Ceiling", unary("CEILING"));

    register_date_add(&profile, |unit, date, amount| {
        format!("DATE_ADD({}, INTERVAL {} {})", date, amount, unit.keyword())
    });
    register_date_parts(&profile, named_part);
    profile.register_function(
        "DateDiff",
        date_diff(|unit, start, end| {
            format!("TIMESTAMPDIFF({}, {}, {})", unit.keyword(), start, end)
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
    fn test_date_add_uses_interval() {
        let node = Node::column("p", "CreatedAt").method("AddYears", vec![Node::var("years", 2)]);
        assert_eq!(
            render(Dialect::MySql, &node),
            "DATE_ADD(p.`CreatedAt`, INTERVAL {{0}} YEAR)"
        );
    }

    #[test]
    fn test_length_and_parts() {
        let node = Node::column("p", "Name").method("Length", vec![]);
        assert_eq!(render(Dialect::MySql, &node), "CHAR_LENGTH(p.`Name`)");
        let node = Node::call("Month", vec![Node::column("p", "CreatedAt")]);
        assert_eq!(render(Dialect::MySql, &node), "MONTH(p.`CreatedAt`)");
    }

    #[test]
    fn test_round_with_digits() {
        let node = Node::call("Round", vec![Node::column("p", "Price"), Node::lit(2)]);
        assert_eq!(render(Dialect::MySql, &node), "ROUND(p.`Price`, {{0}})");
        let node = Node::call("Round", vec![Node::column("p", "Price")]);
        assert_eq!(render(Dialect::MySql, &node), "ROUND(p.`Price`)");
    }
}
