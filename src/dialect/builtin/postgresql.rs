//! PostgreSQL profile: `@name` parameters, double-quote identifiers and real
//! boolean literals.

use super::{extract_part, register_common, register_if_null, register_length};
use crate::ast::DeclaredType;
use crate::dialect::functions::{
    self, date_diff, register_date_add, register_date_parts, unary, DateUnit,
};
use crate::dialect::{Dialect, DialectProfile};

pub fn profile() -> DialectProfile {
    let profile = DialectProfile::new(Dialect::PostgreSql, '@', ('"', '"'))
        .with_bool_literals("TRUE", "FALSE")
        .with_type(DeclaredType::Text, "TEXT")
        .with_type(DeclaredType::Int, "BIGINT")
        .with_type(DeclaredType::Float, "DOUBLE PRECISION")
        .with_type(DeclaredType::DateTime, "TIMESTAMP")
        .with_type(DeclaredType::Bool, "BOOLEAN");

    register_common(&profile);
    register_if_null(&profile, "COALESCE");
    register_length(&profile, "LENGTH");
    profile.register_function("Substring", functions::substring("SUBSTRING", None));
    profile.register_function("Floor", unary("FLOOR"));
    profile.register_function("Ceiling", unary("CEIL"));

    register_date_add(&profile, |unit, date, amount| {
        format!("({} + ({}) * INTERVAL '1 {}')", date, amount, unit.keyword())
    });
    register_date_parts(&profile, extract_part);
    profile.register_function(
        "DateDiff",
        date_diff(|unit, start, end| match unit {
            DateUnit::Year => format!(
                "(EXTRACT(YEAR FROM {}) - EXTRACT(YEAR FROM {}))",
                end, start
            ),
            DateUnit::Month => format!(
                "((EXTRACT(YEAR FROM {end}) - EXTRACT(YEAR FROM {start})) * 12 + EXTRACT(MONTH FROM {end}) - EXTRACT(MONTH FROM {start}))",
                start = start,
                end = end
            ),
            _ => format!(
                "FLOOR(EXTRACT(EPOCH FROM ({} - {})) / {})",
                end,
                start,
                unit.seconds().unwrap_or(1)
            ),
        }),
    );

    profile
}
